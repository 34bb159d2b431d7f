//! The wire envelope exchanged between the bridge and an extension
//! instance over the websocket bus (spec §3, §4.1, §6.1).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `type` discriminant of an [`Envelope`].
///
/// Deserializing an envelope whose `type` is not one of these variants
/// fails with [`ParseError::UnknownType`] — forward-compatibility is only
/// promised for the `payload` object, never for the type enum itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvelopeType {
    InstanceRegister,
    InstanceRegistered,
    InstanceUnregister,
    InstanceUnregistered,
    CallTool,
    CallToolResponse,
    ProcessData,
    ProcessDataResponse,
    ListPublishedFlows,
    ListPublishedFlowsResponse,
    FileOperation,
    FileOperationResponse,
    Ping,
    Pong,
    Error,
}

impl EnvelopeType {
    /// Whether this type is ever originated by the extension side as a
    /// request the server must answer. The server is always the
    /// initiator for these per spec §6.1; an extension-originated
    /// instance of one of these is a protocol error.
    #[must_use]
    pub fn is_server_initiated_only(self) -> bool {
        matches!(
            self,
            Self::CallTool | Self::ProcessData | Self::ListPublishedFlows | Self::FileOperation
        )
    }
}

/// A single JSON frame on the websocket bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub r#type: EnvelopeType,

    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(
        rename = "responseToRequestId",
        skip_serializing_if = "Option::is_none"
    )]
    pub response_to_request_id: Option<String>,

    #[serde(rename = "instanceId", skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// Type-specific payload. Kept as an opaque [`Value`] so that fields
    /// unknown to this version of the bridge round-trip untouched, per
    /// spec §4.1's forward-compatibility requirement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    /// Build a bare envelope of the given type, with no correlation
    /// fields set (used for `PING`/`PONG`).
    #[must_use]
    pub fn bare(r#type: EnvelopeType) -> Self {
        Self {
            r#type,
            request_id: None,
            response_to_request_id: None,
            instance_id: None,
            payload: None,
            error: None,
        }
    }

    /// Build a request envelope: carries `requestId`, expects a reply.
    #[must_use]
    pub fn request(
        r#type: EnvelopeType,
        request_id: impl Into<String>,
        instance_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            r#type,
            request_id: Some(request_id.into()),
            response_to_request_id: None,
            instance_id: Some(instance_id.into()),
            payload: Some(payload),
            error: None,
        }
    }

    /// Build a response envelope: echoes `responseToRequestId`, never
    /// `requestId`.
    #[must_use]
    pub fn response(
        r#type: EnvelopeType,
        response_to_request_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            r#type,
            request_id: None,
            response_to_request_id: Some(response_to_request_id.into()),
            instance_id: None,
            payload: Some(payload),
            error: None,
        }
    }

    /// Build an `ERROR` envelope carrying only the `error` text, optionally
    /// correlated to a request.
    #[must_use]
    pub fn error_envelope(error: impl Into<String>, response_to_request_id: Option<String>) -> Self {
        Self {
            r#type: EnvelopeType::Error,
            request_id: None,
            response_to_request_id,
            instance_id: None,
            payload: None,
            error: Some(error.into()),
        }
    }

    /// Validate the call/response correlation invariant from spec §3:
    /// exactly one of `{requestId, responseToRequestId}` is set on any
    /// envelope that participates in a call/response pair; `PING`/`PONG`
    /// set neither.
    pub fn validate(&self) -> Result<(), ParseError> {
        let has_request_id = self.request_id.is_some();
        let has_response_id = self.response_to_request_id.is_some();

        match self.r#type {
            EnvelopeType::Ping | EnvelopeType::Pong => {
                if has_request_id || has_response_id {
                    return Err(ParseError::InvalidCorrelation(
                        "PING/PONG must not carry requestId or responseToRequestId".to_string(),
                    ));
                }
            }
            EnvelopeType::Error => {
                // ERROR envelopes correlate via responseToRequestId only,
                // and may carry neither when unsolicited.
                if has_request_id {
                    return Err(ParseError::InvalidCorrelation(
                        "ERROR envelopes must not carry requestId".to_string(),
                    ));
                }
            }
            _ => {
                if has_request_id == has_response_id {
                    return Err(ParseError::InvalidCorrelation(format!(
                        "{:?} must carry exactly one of requestId/responseToRequestId",
                        self.r#type
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Errors returned by [`decode`].
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The frame was not valid JSON, or its `type` field was not one of
    /// the known [`EnvelopeType`] variants.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// The frame was valid JSON but violated the correlation-field
    /// invariant.
    #[error("invalid envelope: {0}")]
    InvalidCorrelation(String),
}

/// Serialise an envelope to a JSON text frame.
pub fn encode(envelope: &Envelope) -> Vec<u8> {
    // `Envelope`'s fields are all serde-serializable by construction, so
    // this cannot fail.
    serde_json::to_vec(envelope).expect("Envelope serialization is infallible")
}

/// Parse a JSON text frame into an [`Envelope`], rejecting unknown
/// envelope types and invariant violations.
pub fn decode(bytes: &[u8]) -> Result<Envelope, ParseError> {
    let envelope: Envelope =
        serde_json::from_slice(bytes).map_err(|e| ParseError::Malformed(e.to_string()))?;
    envelope.validate()?;
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_a_request_envelope() {
        let env = Envelope::request(
            EnvelopeType::CallTool,
            "r1",
            "i1",
            json!({"name": "foo", "args": {"x": 1}}),
        );
        let bytes = encode(&env);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn rejects_unknown_type() {
        let bytes = br#"{"type":"NOT_A_REAL_TYPE"}"#;
        assert!(matches!(decode(bytes), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn rejects_ping_with_request_id() {
        let mut env = Envelope::bare(EnvelopeType::Ping);
        env.request_id = Some("r1".to_string());
        assert!(matches!(
            env.validate(),
            Err(ParseError::InvalidCorrelation(_))
        ));
    }

    #[test]
    fn rejects_call_tool_with_both_ids_set() {
        let mut env = Envelope::request(EnvelopeType::CallTool, "r1", "i1", json!({}));
        env.response_to_request_id = Some("r1".to_string());
        assert!(matches!(
            env.validate(),
            Err(ParseError::InvalidCorrelation(_))
        ));
    }

    #[test]
    fn rejects_call_tool_with_neither_id_set() {
        let env = Envelope::bare(EnvelopeType::CallTool);
        assert!(matches!(
            env.validate(),
            Err(ParseError::InvalidCorrelation(_))
        ));
    }

    #[test]
    fn unknown_payload_fields_round_trip() {
        let bytes = br#"{"type":"CALL_TOOL_RESPONSE","responseToRequestId":"r1","payload":{"status":"success","data":{"future_field":42}}}"#;
        let decoded = decode(bytes).unwrap();
        let reencoded = encode(&decoded);
        let redecoded = decode(&reencoded).unwrap();
        assert_eq!(decoded, redecoded);
        assert_eq!(
            redecoded.payload.unwrap()["data"]["future_field"],
            json!(42)
        );
    }

    proptest::proptest! {
        #[test]
        fn request_envelopes_round_trip(request_id in "[a-z0-9]{1,16}", instance_id in "[a-z0-9]{1,16}") {
            let env = Envelope::request(EnvelopeType::CallTool, request_id, instance_id, json!({"k": "v"}));
            let bytes = encode(&env);
            let decoded = decode(&bytes).unwrap();
            prop_assert_eq!(decoded, env);
        }
    }
}
