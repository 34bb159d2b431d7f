//! Shared foundation for the Chrome MCP bridge: error vocabulary,
//! environment-derived configuration, and id/time helpers.

mod config;
mod error;
mod ids;

pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use ids::new_request_id;
