//! MCP-facing tool and flow JSON shapes (spec §3 "Tool descriptor", §4.6,
//! §6.1's `LIST_PUBLISHED_FLOWS_RESPONSE` payload).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-Schema-shaped object describing a tool's arguments.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

/// A tool descriptor returned from `tools/list` (spec §3 "Tool descriptor").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: ToolInputSchema,
}

/// A single piece of tool-call output content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl Content {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// The MCP `tools/call` result, returned verbatim on bus success or
/// synthesised on bus failure (spec §4.8 steps 5-6, §7 propagation).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError")]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CallToolResult {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
            data: None,
        }
    }

    #[must_use]
    pub fn success(data: Value) -> Self {
        // `data` is the verbatim `CALL_TOOL_RESPONSE` payload, shaped
        // `{status, data: {content: [...]}}` (spec §6.1) — the tool's own
        // content array is nested one level deeper than the envelope
        // payload itself.
        let content = match data.get("data").and_then(|d| d.get("content")) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| serde_json::from_value::<Content>(v.clone()).ok())
                .collect(),
            _ => Vec::new(),
        };
        Self {
            content,
            is_error: false,
            data: Some(data),
        }
    }
}

/// Arguments passed to a `tools/call` request (spec §4.8 step 2 strips any
/// legacy `instanceId` field before this reaches the bus).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// A declared variable of a recorded flow, as returned in
/// `LIST_PUBLISHED_FLOWS_RESPONSE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowVariable {
    pub key: String,
    #[serde(rename = "type", default)]
    pub var_type: Option<String>,
    #[serde(default)]
    pub rules: FlowVariableRule,
}

/// Validation rules attached to a flow variable.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlowVariableRule {
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default)]
    pub enum_values: Vec<String>,
}

/// One recorded flow, as listed by `LIST_PUBLISHED_FLOWS_RESPONSE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowItem {
    pub id: u64,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub variables: Vec<FlowVariable>,
    #[serde(default)]
    pub meta: Option<Value>,
}

/// The `LIST_PUBLISHED_FLOWS_RESPONSE` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPublishedFlowsPayload {
    pub status: String,
    #[serde(default)]
    pub items: Vec<FlowItem>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_tool_result_error_shape() {
        let result = CallToolResult::error("Error calling tool: Timeout");
        assert!(result.is_error);
        assert_eq!(result.content[0].text, "Error calling tool: Timeout");
    }

    #[test]
    fn call_tool_result_success_extracts_content() {
        // Shape of a verbatim `CALL_TOOL_RESPONSE` payload (spec §6.1, S1):
        // the content array is nested under `data`, not top-level.
        let data = serde_json::json!({
            "status": "success",
            "data": {"content": [{"type": "text", "text": "ok"}]},
        });
        let result = CallToolResult::success(data);
        assert!(!result.is_error);
        assert_eq!(result.content, vec![Content::text("ok")]);
    }
}
