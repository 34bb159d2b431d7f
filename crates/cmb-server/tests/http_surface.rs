//! Integration tests for the streamable-HTTP MCP surface, driven in-process
//! through the `axum::Router` via `tower::ServiceExt::oneshot` (spec §6.2,
//! §8 scenarios S5/S6), mirroring the style of the pack's websocket
//! integration tests but without opening a real socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use cmb_bus::{BusClient, HubState, InstanceRegistry, PendingRequestTable};
use cmb_server::{build_router, AppState, Dispatcher, SessionStore, ToolCatalogue};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn router() -> axum::Router {
    let registry = Arc::new(InstanceRegistry::new());
    let pending = Arc::new(PendingRequestTable::new());
    let bus = BusClient::new(registry.clone(), pending.clone());
    let hub_state = HubState { registry, pending };

    let sessions = Arc::new(SessionStore::new());
    let catalogue = Arc::new(ToolCatalogue::new(bus.clone()));
    let dispatcher = Arc::new(Dispatcher::new(bus, sessions.clone()));
    let state = AppState::new(
        sessions,
        catalogue,
        dispatcher,
        tokio_util::sync::CancellationToken::new(),
    );
    build_router(state, hub_state, "/ws")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn ping_reports_ok() {
    let response = router()
        .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["message"], "pong");
}

#[tokio::test]
async fn initialize_without_instance_still_mints_a_session() {
    let response = router()
        .oneshot(
            Request::post("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("mcp-session-id"));
}

#[tokio::test]
async fn tools_list_without_bound_instance_returns_only_static_tools() {
    let app = router();

    let init = app
        .clone()
        .oneshot(
            Request::post("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let session_id = init
        .headers()
        .get("mcp-session-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let list = app
        .oneshot(
            Request::post("/mcp")
                .header("content-type", "application/json")
                .header("mcp-session-id", session_id)
                .body(Body::from(
                    json!({"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(list.status(), StatusCode::OK);
    let body = body_json(list).await;
    let tools = body["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "record_replay_flow_run");
}

#[tokio::test]
async fn initialize_prefers_body_instance_id_over_header_and_query() {
    let app = router();
    let response = app
        .oneshot(
            Request::post("/mcp?instanceId=from-query")
                .header("content-type", "application/json")
                .header("x-instance-id", "from-header")
                .body(Body::from(
                    json!({
                        "jsonrpc":"2.0","id":1,"method":"initialize",
                        "params":{"INSTANCE_ID":"from-body"}
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let session_id = response
        .headers()
        .get("mcp-session-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(!session_id.is_empty());
}

#[tokio::test]
async fn delete_then_reuse_of_session_id_is_rejected() {
    let app = router();

    let init = app
        .clone()
        .oneshot(
            Request::post("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let session_id = init
        .headers()
        .get("mcp-session-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let delete = app
        .clone()
        .oneshot(
            Request::delete("/mcp")
                .header("mcp-session-id", session_id.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);

    let reused = app
        .oneshot(
            Request::post("/mcp")
                .header("content-type", "application/json")
                .header("mcp-session-id", session_id)
                .body(Body::from(
                    json!({"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(reused.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_session_header_on_non_initialize_request_is_rejected() {
    let response = router()
        .oneshot(
            Request::post("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"jsonrpc":"2.0","id":1,"method":"tools/list","params":{}}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
