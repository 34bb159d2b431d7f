//! Maps [`BridgeError`] onto the two client-facing error surfaces: JSON-RPC
//! error objects (spec §4.7 transport errors) and HTTP status codes for the
//! streamable-HTTP transport's envelope-level failures (spec §6.2).

use axum::http::StatusCode;
use cmb_core::BridgeError;
use cmb_protocol::jsonrpc::error_codes;

/// The JSON-RPC error code and message to report for a transport-level
/// (not tool-call-level) [`BridgeError`].
#[must_use]
pub fn to_jsonrpc_error(err: &BridgeError) -> (i64, String) {
    let code = match err {
        BridgeError::InvalidSession(_) => error_codes::INVALID_REQUEST,
        BridgeError::UnknownInstance | BridgeError::MissingInstance => error_codes::INVALID_REQUEST,
        _ => error_codes::INTERNAL_ERROR,
    };
    (code, err.detail())
}

/// The HTTP status to answer with when a transport-level request cannot
/// even be dispatched (as opposed to a tool call failing, which is always
/// reported as a `200 OK` with `isError: true` per MCP convention).
#[must_use]
pub fn to_status_code(err: &BridgeError) -> StatusCode {
    match err {
        // spec §7: "InvalidSession ... HTTP 400."
        BridgeError::InvalidSession(_) => StatusCode::BAD_REQUEST,
        BridgeError::UnknownInstance | BridgeError::MissingInstance => StatusCode::BAD_REQUEST,
        BridgeError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_session_maps_to_bad_request() {
        assert_eq!(
            to_status_code(&BridgeError::InvalidSession("x".to_string())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unknown_instance_is_a_jsonrpc_invalid_request() {
        let (code, _) = to_jsonrpc_error(&BridgeError::UnknownInstance);
        assert_eq!(code, error_codes::INVALID_REQUEST);
    }
}
