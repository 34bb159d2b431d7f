//! Process entry point for the Chrome MCP bridge.
//!
//! Wires the instance registry, pending-request table, websocket hub, and
//! MCP session/dispatch layer together, binds the HTTP listener, and
//! drives graceful shutdown on Ctrl+C/SIGTERM (spec §6.5).

use std::sync::Arc;

use clap::Parser;
use cmb_bus::{spawn_background_tasks, BusClient, HubState, InstanceRegistry, PendingRequestTable};
use cmb_core::BridgeConfig;
use cmb_server::{build_router, shutdown_signal, AppState, Dispatcher, SessionStore, ToolCatalogue};
use tokio_util::sync::CancellationToken;

/// Multi-tenant MCP bridge fronting browser-extension instances.
#[derive(Debug, Parser)]
#[command(name = "chrome-mcp-bridge", version)]
struct Cli {
    /// TCP port to bind. Overrides `CHROME_MCP_PORT`/`MCP_HTTP_PORT` if set.
    #[arg(long, env = "CHROME_MCP_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = BridgeConfig::from_env();
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.publish_resolved_port();

    let registry = Arc::new(InstanceRegistry::new());
    let pending = Arc::new(PendingRequestTable::new());
    let bus = BusClient::new(registry.clone(), pending.clone());

    let hub_state = HubState {
        registry: registry.clone(),
        pending: pending.clone(),
    };

    let sessions = Arc::new(SessionStore::new());
    let catalogue = Arc::new(ToolCatalogue::new(bus.clone()));
    let dispatcher = Arc::new(Dispatcher::new(bus, sessions.clone()));
    let shutdown = CancellationToken::new();

    let app_state = AppState::new(sessions, catalogue, dispatcher, shutdown.clone());
    let router = build_router(app_state, hub_state.clone(), &config.ws_path);

    let background_tasks =
        spawn_background_tasks(hub_state, config.idle_cutoff, config.sweep_interval);

    let listener = match tokio::net::TcpListener::bind(config.bind_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %config.bind_addr(), "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %config.bind_addr(), ws_path = %config.ws_path, "chrome-mcp-bridge listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(serve_shutdown))
        .await
        .unwrap_or_else(|e| tracing::error!(error = %e, "server exited with error"));

    tracing::info!("closing instance connections and failing pending requests");
    registry.close_all();
    pending.fail_all();
    for task in background_tasks {
        task.abort();
    }

    tracing::info!("shutdown complete");
}
