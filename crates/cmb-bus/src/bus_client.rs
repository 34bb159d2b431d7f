//! Bus client (spec §4.5): the server→instance send-and-wait primitive
//! used by the dispatcher, the dynamic-tool lister, and file ops.

use std::sync::Arc;
use std::time::Duration;

use cmb_core::{new_request_id, BridgeError, BridgeResult};
use cmb_protocol::{encode, Envelope, EnvelopeType};
use serde_json::Value;

use crate::pending::PendingRequestTable;
use crate::registry::InstanceRegistry;

/// Server→instance send-and-wait primitive.
///
/// Holds no lock across the blocking send: the connection handle is
/// captured once from the registry, and the critical section over the
/// pending table is released before awaiting the response (spec §4.5).
#[derive(Clone)]
pub struct BusClient {
    registry: Arc<InstanceRegistry>,
    pending: Arc<PendingRequestTable>,
}

impl BusClient {
    #[must_use]
    pub fn new(registry: Arc<InstanceRegistry>, pending: Arc<PendingRequestTable>) -> Self {
        Self { registry, pending }
    }

    /// Send `payload` of type `env_type` to `instance_id` and await its
    /// correlated response, or fail with the appropriate [`BridgeError`].
    pub async fn send_request(
        &self,
        instance_id: &str,
        env_type: EnvelopeType,
        payload: Value,
        timeout: Duration,
    ) -> BridgeResult<Value> {
        let conn = self
            .registry
            .get_connection(instance_id)
            .ok_or(BridgeError::UnknownInstance)?;

        let request_id = new_request_id();
        let waiter = self
            .pending
            .enroll(request_id.clone(), instance_id.to_string(), timeout);

        let envelope = Envelope::request(env_type, request_id.clone(), instance_id, payload);
        let bytes = encode(&envelope);
        let text = String::from_utf8(bytes).map_err(|e| BridgeError::SendFailed(e.to_string()))?;

        if !conn.send(axum::extract::ws::Message::Text(text.into())) {
            self.pending.cancel(&request_id);
            return Err(BridgeError::SendFailed(
                "connection writer queue closed".to_string(),
            ));
        }

        match tokio::time::timeout(timeout, waiter).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::ConnectionLost),
            Err(_) => {
                self.pending.cancel(&request_id);
                Err(BridgeError::Timeout {
                    millis: timeout.as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use axum::extract::ws::Message;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn unknown_instance_fails_fast() {
        let registry = Arc::new(InstanceRegistry::new());
        let pending = Arc::new(PendingRequestTable::new());
        let bus = BusClient::new(registry, pending);

        let result = bus
            .send_request("nope", EnvelopeType::CallTool, json!({}), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(BridgeError::UnknownInstance)));
    }

    #[tokio::test]
    async fn successful_round_trip_resolves_with_payload() {
        let registry = Arc::new(InstanceRegistry::new());
        let pending = Arc::new(PendingRequestTable::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = Connection::new(tx);
        registry.register(conn, Some("i1".to_string()));

        let bus = BusClient::new(registry, pending.clone());
        let call = tokio::spawn({
            let bus = bus.clone();
            async move {
                bus.send_request(
                    "i1",
                    EnvelopeType::CallTool,
                    json!({"name": "foo"}),
                    Duration::from_secs(5),
                )
                .await
            }
        });

        // Observe the outbound envelope and reply as the instance would.
        let Message::Text(sent) = rx.recv().await.unwrap() else {
            panic!("expected text frame");
        };
        let sent_envelope = cmb_protocol::decode(sent.as_bytes()).unwrap();
        pending.complete(
            sent_envelope.request_id.as_ref().unwrap(),
            json!({"status": "success", "data": {"ok": true}}),
        );

        let result = call.await.unwrap().unwrap();
        assert_eq!(result, json!({"status": "success", "data": {"ok": true}}));
    }

    #[tokio::test]
    async fn timeout_cleans_up_pending_entry() {
        let registry = Arc::new(InstanceRegistry::new());
        let pending = Arc::new(PendingRequestTable::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Connection::new(tx);
        registry.register(conn, Some("i1".to_string()));

        let bus = BusClient::new(registry, pending.clone());
        let result = bus
            .send_request(
                "i1",
                EnvelopeType::CallTool,
                json!({}),
                Duration::from_millis(10),
            )
            .await;
        assert!(matches!(result, Err(BridgeError::Timeout { .. })));
        assert!(pending.is_empty());
    }
}
