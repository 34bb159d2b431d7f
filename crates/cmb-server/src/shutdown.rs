//! Graceful shutdown (spec §6.5): Ctrl+C / SIGTERM trigger the same
//! [`tokio_util::sync::CancellationToken`], which axum's graceful-shutdown
//! future and the background sweepers all select on.

use tokio_util::sync::CancellationToken;

/// Resolves once Ctrl+C or (on Unix) SIGTERM is received. Intended as the
/// future passed to `axum::serve(...).with_graceful_shutdown(...)`.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => tracing::warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Ctrl+C received, initiating shutdown"),
        () = terminate => tracing::info!("SIGTERM received, initiating shutdown"),
        () = token.cancelled() => {}
    }

    token.cancel();
}
