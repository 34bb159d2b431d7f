//! MCP session layer, tool catalogue, and `tools/call` dispatcher (spec
//! §4.6-§4.8): everything between the client-facing HTTP transports and
//! the [`cmb_bus::BusClient`].

mod catalogue;
mod context;
mod cors;
mod dispatcher;
mod error;
mod http;
mod session;
mod shutdown;

pub use catalogue::ToolCatalogue;
pub use context::current_session_id;
pub use dispatcher::Dispatcher;
pub use http::{build_router, AppState};
pub use session::{SessionRecord, SessionStore};
pub use shutdown::shutdown_signal;
