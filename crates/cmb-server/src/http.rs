//! Client-facing MCP transports (spec §4.7, §6.2-§6.3): the streamable-HTTP
//! `/mcp` endpoint (POST/GET/DELETE) and the legacy SSE pair (`/sse` +
//! `/messages`), both built on the same `tools/*` dispatch core.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use cmb_bus::HubState;
use cmb_protocol::jsonrpc::{error_codes, JsonRpcRequest, JsonRpcResponse};
use cmb_protocol::CallToolParams;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::catalogue::ToolCatalogue;
use crate::context::with_session;
use crate::cors::bridge_cors_layer;
use crate::dispatcher::Dispatcher;
use crate::error::{to_jsonrpc_error, to_status_code};
use crate::session::SessionStore;

const SESSION_HEADER: &str = "Mcp-Session-Id";
const PROTOCOL_VERSION: &str = "2025-06-18";

/// Shared state for every MCP-facing HTTP route.
#[derive(Clone)]
pub struct AppState {
    sessions: Arc<SessionStore>,
    catalogue: Arc<ToolCatalogue>,
    dispatcher: Arc<Dispatcher>,
    /// Per-session outbound channel for the legacy SSE transport, keyed by
    /// session id. The streamable transport's own GET stream registers
    /// here too, so both transports share one delivery mechanism.
    sse_channels: Arc<DashMap<String, mpsc::UnboundedSender<Event>>>,
    pub shutdown: CancellationToken,
}

impl AppState {
    #[must_use]
    pub fn new(
        sessions: Arc<SessionStore>,
        catalogue: Arc<ToolCatalogue>,
        dispatcher: Arc<Dispatcher>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sessions,
            catalogue,
            dispatcher,
            sse_channels: Arc::new(DashMap::new()),
            shutdown,
        }
    }
}

/// Assemble the full router: the MCP client-facing routes plus the
/// extension-facing websocket upgrade, merged onto one port (spec §6).
#[must_use]
pub fn build_router(state: AppState, hub_state: HubState, ws_path: &str) -> Router {
    let mcp_routes = Router::new()
        .route(
            "/mcp",
            post(mcp_post_handler)
                .get(mcp_get_handler)
                .delete(mcp_delete_handler),
        )
        .route("/sse", get(legacy_sse_get_handler))
        .route("/messages", post(legacy_messages_post_handler))
        .route("/ping", get(ping_handler))
        .with_state(state)
        .layer(bridge_cors_layer());

    let ws_routes = Router::new()
        .route(ws_path, get(cmb_bus::websocket_upgrade_handler))
        .with_state(hub_state);

    mcp_routes.merge(ws_routes)
}

async fn ping_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok", "message": "pong" })))
}

/// Resolve the instance id to bind a new session to, per spec §4.7's
/// precedence: body `params.INSTANCE_ID`, then the `X-Instance-Id`
/// header, then an `instanceId` query parameter.
fn extract_instance_id(
    headers: &HeaderMap,
    params: &Value,
    query: &HashMap<String, String>,
) -> Option<String> {
    params
        .get("INSTANCE_ID")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            headers
                .get("X-Instance-Id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .or_else(|| query.get("instanceId").cloned())
}

fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn server_info_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": { "name": "chrome-mcp-bridge", "version": env!("CARGO_PKG_VERSION") },
        "capabilities": { "tools": {} },
    })
}

/// Handle one JSON-RPC request against an already-known session. Returns
/// `None` for notifications, which never receive a response body.
async fn dispatch_known_session(
    state: &AppState,
    session_id: &str,
    req: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    let id = req.id.clone().unwrap_or(Value::Null);
    if req.is_notification() {
        return None;
    }

    let Some(instance_id) = state.sessions.instance_id(session_id) else {
        let (code, message) =
            to_jsonrpc_error(&cmb_core::BridgeError::InvalidSession(session_id.to_string()));
        return Some(JsonRpcResponse::error(id, code, message));
    };

    let response = match req.method.as_str() {
        "tools/list" => {
            let tools = state.catalogue.list_tools(instance_id.as_deref()).await;
            JsonRpcResponse::success(id, json!({ "tools": tools }))
        }
        "tools/call" => match serde_json::from_value::<CallToolParams>(req.params) {
            Ok(params) => {
                let result = with_session(
                    Some(session_id.to_string()),
                    state.dispatcher.call_tool(&params.name, params.arguments),
                )
                .await;
                JsonRpcResponse::success(id, serde_json::to_value(result).unwrap_or(Value::Null))
            }
            Err(e) => JsonRpcResponse::error(
                id,
                error_codes::INVALID_REQUEST,
                format!("invalid tools/call params: {e}"),
            ),
        },
        "ping" => JsonRpcResponse::success(id, json!({})),
        other => JsonRpcResponse::error(
            id,
            error_codes::METHOD_NOT_FOUND,
            format!("unknown method {other}"),
        ),
    };

    Some(response)
}

/// `POST /mcp`: the streamable-HTTP request channel. `initialize` mints a
/// fresh session and returns it via the `Mcp-Session-Id` response header;
/// every other method requires that header on the request.
async fn mcp_post_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let req: JsonRpcRequest = match serde_json::from_value(body) {
        Ok(r) => r,
        Err(e) => {
            let resp = JsonRpcResponse::error(
                Value::Null,
                error_codes::PARSE_ERROR,
                format!("malformed JSON-RPC request: {e}"),
            );
            return (StatusCode::BAD_REQUEST, HeaderMap::new(), Json(resp)).into_response();
        }
    };

    if req.method == "initialize" {
        let instance_id = extract_instance_id(&headers, &req.params, &query);
        let session_id = state.sessions.create(instance_id);
        let resp = JsonRpcResponse::success(
            req.id.clone().unwrap_or(Value::Null),
            server_info_result(),
        );
        let mut response_headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            response_headers.insert(SESSION_HEADER, value);
        }
        return (StatusCode::OK, response_headers, Json(resp)).into_response();
    }

    let Some(session_id) = session_id_from_headers(&headers) else {
        let resp = JsonRpcResponse::error(
            req.id.clone().unwrap_or(Value::Null),
            error_codes::INVALID_REQUEST,
            format!("missing {SESSION_HEADER} header"),
        );
        return (StatusCode::BAD_REQUEST, HeaderMap::new(), Json(resp)).into_response();
    };

    if !state.sessions.has(&session_id) {
        let err = cmb_core::BridgeError::InvalidSession(session_id.clone());
        let (code, message) = to_jsonrpc_error(&err);
        let resp = JsonRpcResponse::error(req.id.clone().unwrap_or(Value::Null), code, message);
        return (to_status_code(&err), HeaderMap::new(), Json(resp)).into_response();
    }

    if req.method == "notifications/initialized" {
        return (StatusCode::NO_CONTENT, HeaderMap::new(), Json(Value::Null)).into_response();
    }

    match dispatch_known_session(&state, &session_id, req).await {
        Some(resp) => (StatusCode::OK, HeaderMap::new(), Json(resp)).into_response(),
        None => (StatusCode::NO_CONTENT, HeaderMap::new(), Json(Value::Null)).into_response(),
    }
}

/// `GET /mcp`: opens the streamable-HTTP SSE channel a client uses to
/// receive asynchronously-delivered responses and server-initiated
/// messages for an existing session.
async fn mcp_get_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    let session_id = session_id_from_headers(&headers).ok_or(StatusCode::BAD_REQUEST)?;
    if !state.sessions.has(&session_id) {
        return Err(to_status_code(&cmb_core::BridgeError::InvalidSession(
            session_id,
        )));
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    state.sse_channels.insert(session_id.clone(), tx);

    let stream = async_stream::stream! {
        yield Ok::<Event, axum::Error>(Event::default().event("endpoint").data("/mcp"));
        while let Some(event) = rx.recv().await {
            yield Ok(event);
        }
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );

    Ok((
        StatusCode::OK,
        response_headers,
        Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(30))),
    ))
}

/// `DELETE /mcp`: terminates a session (spec §6.2's session-lifecycle
/// close path).
async fn mcp_delete_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, StatusCode> {
    let session_id = session_id_from_headers(&headers).ok_or(StatusCode::BAD_REQUEST)?;
    state.sessions.remove(&session_id);
    state.sse_channels.remove(&session_id);
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /sse`: the legacy transport's event stream. The first event is the
/// `/messages` URI a client must POST subsequent requests to, carrying the
/// freshly minted session id as a query parameter.
async fn legacy_sse_get_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session_id = state.sessions.create(None);
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    state.sse_channels.insert(session_id.clone(), tx);

    let endpoint = format!("/messages?sessionId={session_id}");
    let stream = async_stream::stream! {
        yield Ok::<Event, axum::Error>(Event::default().event("endpoint").data(endpoint));
        while let Some(event) = rx.recv().await {
            yield Ok(event);
        }
    };

    (
        StatusCode::OK,
        Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(30))),
    )
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "instanceId", default)]
    instance_id: Option<String>,
}

/// `POST /messages`: the legacy transport's request channel. The response
/// is delivered over the matching `/sse` stream, not in this POST's body
/// (spec §6.3); this handler only acknowledges receipt.
async fn legacy_messages_post_handler(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let req: JsonRpcRequest = match serde_json::from_value(body) {
        Ok(r) => r,
        Err(_) => return StatusCode::BAD_REQUEST,
    };

    if req.method == "initialize" {
        let query_map = query
            .instance_id
            .clone()
            .map(|v| HashMap::from([("instanceId".to_string(), v)]))
            .unwrap_or_default();
        let instance_id = extract_instance_id(&headers, &req.params, &query_map);
        // SessionStore bindings are immutable after creation; the legacy
        // flow instead re-keys by minting the real binding at this point
        // and retargeting the SSE channel the client already holds.
        let bound_session_id = state.sessions.create(instance_id);
        if let Some((_, tx)) = state.sse_channels.remove(&query.session_id) {
            state.sse_channels.insert(bound_session_id.clone(), tx);
        }
        state.sessions.remove(&query.session_id);

        let resp = JsonRpcResponse::success(
            req.id.clone().unwrap_or(Value::Null),
            server_info_result(),
        );
        deliver_sse(&state, &bound_session_id, &resp);
        return StatusCode::ACCEPTED;
    }

    if let Some(resp) = dispatch_known_session(&state, &query.session_id, req).await {
        deliver_sse(&state, &query.session_id, &resp);
    }
    StatusCode::ACCEPTED
}

fn deliver_sse(state: &AppState, session_id: &str, resp: &JsonRpcResponse) {
    if let Some(tx) = state.sse_channels.get(session_id) {
        let data = serde_json::to_string(resp).unwrap_or_default();
        let _ = tx.send(Event::default().event("message").data(data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_instance_id_wins_over_header_and_query() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Instance-Id", HeaderValue::from_static("from-header"));
        let query = HashMap::from([("instanceId".to_string(), "from-query".to_string())]);
        let params = json!({ "INSTANCE_ID": "from-body" });
        assert_eq!(
            extract_instance_id(&headers, &params, &query),
            Some("from-body".to_string())
        );
    }

    #[test]
    fn header_wins_over_query_when_body_is_silent() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Instance-Id", HeaderValue::from_static("from-header"));
        let query = HashMap::from([("instanceId".to_string(), "from-query".to_string())]);
        assert_eq!(
            extract_instance_id(&headers, &json!({}), &query),
            Some("from-header".to_string())
        );
    }

    #[test]
    fn query_is_the_last_resort() {
        let query = HashMap::from([("instanceId".to_string(), "from-query".to_string())]);
        assert_eq!(
            extract_instance_id(&HeaderMap::new(), &json!({}), &query),
            Some("from-query".to_string())
        );
    }

    #[test]
    fn none_of_the_three_sources_present_leaves_it_unbound() {
        assert_eq!(
            extract_instance_id(&HeaderMap::new(), &json!({}), &HashMap::new()),
            None
        );
    }
}
