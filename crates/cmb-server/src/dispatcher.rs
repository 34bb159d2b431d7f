//! `tools/call` dispatcher (spec §4.8): resolves the ambient session to an
//! instance, rewrites `flow.<slug>` calls onto the built-in flow runner,
//! and relays the result through the bus.

use std::sync::Arc;

use cmb_bus::{BusClient, TimeoutClass};
use cmb_core::BridgeError;
use cmb_protocol::{CallToolResult, EnvelopeType, ListPublishedFlowsPayload};
use serde_json::{json, Value};

use crate::catalogue::{find_flow_by_slug, RECORD_REPLAY_FLOW_RUN};
use crate::context::current_session_id;
use crate::session::SessionStore;

/// Resolves and executes one `tools/call` request.
#[derive(Clone)]
pub struct Dispatcher {
    bus: BusClient,
    sessions: Arc<SessionStore>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(bus: BusClient, sessions: Arc<SessionStore>) -> Self {
        Self { bus, sessions }
    }

    /// Run `name(arguments)` against the instance bound to the ambient
    /// session, following spec §4.8's resolution algorithm. Never returns
    /// an `Err`: bus and resolution failures are folded into an
    /// `isError: true` [`CallToolResult`], matching MCP's error-as-content
    /// convention (spec §7).
    pub async fn call_tool(&self, name: &str, mut arguments: Value) -> CallToolResult {
        let Some(instance_id) = self.resolve_instance() else {
            return CallToolResult::error(BridgeError::MissingInstance.tool_call_message());
        };

        // A legacy caller may still pass instanceId explicitly; the bound
        // session's instance is authoritative, so the field is dropped
        // before relaying (spec §4.8 step 2).
        if let Value::Object(map) = &mut arguments {
            map.remove("instanceId");
        }

        let (target_name, target_args) = if let Some(stripped) = name.strip_prefix("flow.") {
            match self.resolve_flow(&instance_id, stripped).await {
                Ok(flow_id) => (
                    RECORD_REPLAY_FLOW_RUN.to_string(),
                    json!({ "flowId": flow_id, "args": arguments }),
                ),
                Err(e) => return CallToolResult::error(e.tool_call_message()),
            }
        } else {
            (name.to_string(), arguments)
        };

        let payload = json!({
            "name": target_name,
            "args": target_args,
            "instanceId": instance_id,
        });

        match self
            .bus
            .send_request(
                &instance_id,
                EnvelopeType::CallTool,
                payload,
                TimeoutClass::ToolDispatch.default_timeout(),
            )
            .await
        {
            Ok(value) => CallToolResult::success(value),
            Err(e) => CallToolResult::error(e.tool_call_message()),
        }
    }

    /// The instance bound to the ambient session, per spec §4.7's
    /// propagation mechanism. `None` if no session is ambient, the session
    /// is unknown, or it has no instance bound.
    fn resolve_instance(&self) -> Option<String> {
        let session_id = current_session_id()?;
        self.sessions.instance_id(&session_id)?
    }

    /// Look up the flow id behind a `flow.<slug>` name by re-querying the
    /// instance's published flows (spec §4.8 step 3).
    async fn resolve_flow(&self, instance_id: &str, slug: &str) -> Result<u64, BridgeError> {
        let value = self
            .bus
            .send_request(
                instance_id,
                EnvelopeType::ListPublishedFlows,
                json!({}),
                TimeoutClass::ListPublishedFlows.default_timeout(),
            )
            .await?;

        let payload: ListPublishedFlowsPayload = serde_json::from_value(value)
            .map_err(|e| BridgeError::Protocol(e.to_string()))?;

        let tool_name = format!("flow.{slug}");
        find_flow_by_slug(&payload.items, &tool_name)
            .map(|item| item.id)
            .ok_or_else(|| BridgeError::FlowNotFound(tool_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::with_session;
    use cmb_bus::{BusClient, InstanceRegistry, PendingRequestTable};
    use cmb_protocol::decode;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn wired() -> (Dispatcher, Arc<SessionStore>, mpsc::UnboundedReceiver<axum::extract::ws::Message>) {
        let registry = Arc::new(InstanceRegistry::new());
        let pending = Arc::new(PendingRequestTable::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = cmb_bus::Connection::new(tx);
        registry.register(conn, Some("i1".to_string()));
        let bus = BusClient::new(registry, pending.clone());
        let sessions = Arc::new(SessionStore::new());
        (Dispatcher::new(bus, sessions.clone()), sessions, rx)
    }

    #[tokio::test]
    async fn no_ambient_session_yields_missing_instance_error() {
        let (dispatcher, _sessions, _rx) = wired();
        let result = dispatcher.call_tool("click", json!({})).await;
        assert!(result.is_error);
        assert!(result.content[0].text.contains("instance not bound"));
    }

    #[tokio::test]
    async fn plain_tool_call_relays_through_the_bus() {
        let (dispatcher, sessions, mut rx) = wired();
        let session_id = sessions.create(Some("i1".to_string()));

        let call = tokio::spawn(async move {
            with_session(Some(session_id), dispatcher.call_tool("click", json!({"x": 1}))).await
        });

        let axum::extract::ws::Message::Text(sent) = rx.recv().await.unwrap() else {
            panic!("expected text frame");
        };
        let envelope = decode(sent.as_bytes()).unwrap();
        assert_eq!(envelope.payload.unwrap()["name"], json!("click"));

        // The test never completes the pending entry; drop the task to
        // avoid waiting out the dispatch timeout.
        call.abort();
    }
}
