//! Ambient session propagation (spec §4.7/§9): the `sessionId` carried by
//! the inbound HTTP frame is made available to the dispatcher without
//! threading it through every intermediate call, scoped to exactly the
//! lifetime of the request's handler task.

use std::future::Future;

tokio::task_local! {
    static SESSION_ID: Option<String>;
}

/// Run `fut` with `session_id` established as the ambient session for the
/// duration of its execution. Established on the handler's stack frame and
/// torn down when the handler returns, per spec's "task-local storage
/// facility" note.
pub async fn with_session<F: Future>(session_id: Option<String>, fut: F) -> F::Output {
    SESSION_ID.scope(session_id, fut).await
}

/// The session id ambient to the current task, if one was established by
/// [`with_session`]. Returns `None` outside of a scoped task, or when the
/// request carried no session id.
#[must_use]
pub fn current_session_id() -> Option<String> {
    SESSION_ID.try_with(Clone::clone).unwrap_or(None)
}
