//! Bridge-wide error vocabulary (spec §7).

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Error kinds surfaced by the registry, bus, and session layers.
///
/// Every variant here corresponds to one of the named error kinds in the
/// error-handling design: callers match on the variant rather than on
/// message text so the MCP/HTTP-layer propagation rules can be applied
/// mechanically.
#[derive(Debug, thiserror::Error, Clone)]
#[non_exhaustive]
pub enum BridgeError {
    /// No registry record for the supplied instance id.
    #[error("instance not bound")]
    UnknownInstance,

    /// Session exists but has no instance binding.
    #[error("instance not bound")]
    MissingInstance,

    /// A pending request's deadline elapsed with no response.
    #[error("Timeout")]
    Timeout {
        /// Timeout that elapsed, in milliseconds.
        millis: u64,
    },

    /// The extension's connection closed while requests were outstanding.
    #[error("connection to instance closed")]
    ConnectionLost,

    /// Writing the envelope to the socket failed before a response could
    /// be awaited.
    #[error("failed to send request to instance: {0}")]
    SendFailed(String),

    /// Envelope decoding failed, or an envelope violated the direction
    /// rules (e.g. an extension-originated `CALL_TOOL`).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An HTTP request referenced an unknown or missing session id.
    #[error("invalid session: {0}")]
    InvalidSession(String),

    /// The server is shutting down; all pending waiters receive this.
    #[error("server is shutting down")]
    ShuttingDown,

    /// The named dynamic flow could not be resolved on the bound instance.
    #[error("flow not found for tool {0}")]
    FlowNotFound(String),

    /// Configuration could not be derived from the environment.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BridgeError {
    /// Human-readable text embedded verbatim in MCP tool-call error
    /// content, per spec §7's propagation rule (`"Error calling tool: <text>"`).
    #[must_use]
    pub fn tool_call_message(&self) -> String {
        format!("Error calling tool: {self}")
    }

    /// Longer-form diagnostic text for logs, distinct from the short
    /// `Display` text surfaced to MCP clients (e.g. `Timeout` vs
    /// `request timed out after 120000ms`).
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Timeout { millis } => format!("request timed out after {millis}ms"),
            other => other.to_string(),
        }
    }
}
