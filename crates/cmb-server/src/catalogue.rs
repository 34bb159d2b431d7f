//! Tool catalogue (spec §4.6): the fixed set of built-in tools, plus the
//! per-instance `flow.<slug>` tools synthesised from that instance's
//! published flows.

use std::collections::HashMap;

use cmb_bus::{BusClient, TimeoutClass};
use cmb_protocol::{
    EnvelopeType, FlowItem, FlowVariable, ListPublishedFlowsPayload, ToolDescriptor,
    ToolInputSchema,
};
use serde_json::{json, Value};

/// Name of the single built-in tool that a `flow.<slug>` call is rewritten
/// into, per spec §4.8 step 3.
pub const RECORD_REPLAY_FLOW_RUN: &str = "record_replay_flow_run";

/// Universal run-control properties merged into every synthesised
/// `flow.<slug>` schema, independent of the flow's own declared variables
/// (spec §4.6).
fn universal_run_control_properties() -> HashMap<String, Value> {
    let mut props = HashMap::new();
    props.insert(
        "tabTarget".to_string(),
        json!({
            "type": "string",
            "enum": ["current", "new"],
            "default": "current",
            "description": "Which browser tab the flow should run against."
        }),
    );
    props.insert(
        "refresh".to_string(),
        json!({
            "type": "boolean",
            "default": false,
            "description": "Reload the target tab before running the flow."
        }),
    );
    props.insert(
        "captureNetwork".to_string(),
        json!({
            "type": "boolean",
            "default": false,
            "description": "Record network activity observed during the run."
        }),
    );
    props.insert(
        "returnLogs".to_string(),
        json!({
            "type": "boolean",
            "default": false,
            "description": "Include the flow's console/step logs in the result."
        }),
    );
    props.insert(
        "timeoutMs".to_string(),
        json!({
            "type": "number",
            "minimum": 0,
            "description": "Override the default run timeout, in milliseconds."
        }),
    );
    props
}

/// Map a recorded flow variable's declared type to a JSON-Schema property
/// node (spec §4.6's type-mapping table).
fn variable_to_schema_property(variable: &FlowVariable) -> Value {
    let enum_values = &variable.rules.enum_values;
    if !enum_values.is_empty() {
        return json!({ "type": "string", "enum": enum_values });
    }

    match variable.var_type.as_deref() {
        Some("boolean") => json!({ "type": "boolean" }),
        Some("number") => json!({ "type": "number" }),
        Some("array") => json!({ "type": "array", "items": { "type": "string" } }),
        _ => json!({ "type": "string" }),
    }
}

/// Build the `flow.<slug>` descriptor for one published flow.
fn flow_to_descriptor(item: &FlowItem) -> ToolDescriptor {
    let description = item
        .meta
        .as_ref()
        .and_then(|m| m.get("tool"))
        .and_then(|t| t.get("description"))
        .and_then(|d| d.as_str())
        .map(str::to_string)
        .or_else(|| item.description.clone())
        .unwrap_or_else(|| format!("Recorded flow '{}'", item.slug));

    let mut properties = universal_run_control_properties();
    let mut required = Vec::new();
    for variable in &item.variables {
        properties.insert(variable.key.clone(), variable_to_schema_property(variable));
        if variable.rules.required {
            required.push(variable.key.clone());
        }
    }

    ToolDescriptor {
        name: format!("flow.{}", item.slug),
        description,
        input_schema: ToolInputSchema {
            schema_type: "object".to_string(),
            properties,
            required,
        },
    }
}

/// The built-in tool that runs a recorded flow by id. `flow.<slug>` entries
/// are a discoverability convenience over this one primitive (spec §4.8
/// step 3).
fn record_replay_flow_run_descriptor() -> ToolDescriptor {
    let mut properties = HashMap::new();
    properties.insert("flowId".to_string(), json!({ "type": "number" }));
    properties.insert(
        "args".to_string(),
        json!({ "type": "object", "description": "Flow variable values, by key." }),
    );
    ToolDescriptor {
        name: RECORD_REPLAY_FLOW_RUN.to_string(),
        description: "Run a previously recorded flow by id, passing variable values.".to_string(),
        input_schema: ToolInputSchema {
            schema_type: "object".to_string(),
            properties,
            required: vec!["flowId".to_string()],
        },
    }
}

/// Produces the `tools/list` result: the fixed static set, plus (when bound
/// to a live instance) the dynamic `flow.*` tools synthesised from that
/// instance's `LIST_PUBLISHED_FLOWS_RESPONSE`.
#[derive(Clone)]
pub struct ToolCatalogue {
    bus: BusClient,
}

impl ToolCatalogue {
    #[must_use]
    pub fn new(bus: BusClient) -> Self {
        Self { bus }
    }

    /// The fixed, instance-independent tool set.
    #[must_use]
    pub fn static_tools() -> Vec<ToolDescriptor> {
        vec![record_replay_flow_run_descriptor()]
    }

    /// List tools visible to a session. With no bound instance, only the
    /// static tools are returned; a bus failure degrades the same way
    /// (dynamic tools are best-effort, spec §4.6).
    pub async fn list_tools(&self, instance_id: Option<&str>) -> Vec<ToolDescriptor> {
        let mut tools = Self::static_tools();

        let Some(instance_id) = instance_id else {
            return tools;
        };

        let result = self
            .bus
            .send_request(
                instance_id,
                EnvelopeType::ListPublishedFlows,
                json!({}),
                TimeoutClass::ListPublishedFlows.default_timeout(),
            )
            .await;

        let Ok(value) = result else {
            return tools;
        };

        if let Ok(payload) = serde_json::from_value::<ListPublishedFlowsPayload>(value) {
            tools.extend(payload.items.iter().map(flow_to_descriptor));
        }

        tools
    }
}

/// Resolve a `flow.<slug>` tool name back to the flow it names, among the
/// instance's currently published flows.
pub fn find_flow_by_slug<'a>(items: &'a [FlowItem], tool_name: &str) -> Option<&'a FlowItem> {
    let slug = tool_name.strip_prefix("flow.")?;
    items.iter().find(|item| item.slug == slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmb_protocol::FlowVariableRule;

    #[test]
    fn static_tools_include_record_replay_flow_run() {
        let tools = ToolCatalogue::static_tools();
        assert!(tools.iter().any(|t| t.name == RECORD_REPLAY_FLOW_RUN));
    }

    #[test]
    fn flow_descriptor_merges_universal_and_declared_properties() {
        let item = FlowItem {
            id: 1,
            slug: "login".to_string(),
            description: Some("Logs a user in".to_string()),
            variables: vec![FlowVariable {
                key: "username".to_string(),
                var_type: Some("string".to_string()),
                rules: FlowVariableRule {
                    required: true,
                    enum_values: vec![],
                },
            }],
            meta: None,
        };
        let descriptor = flow_to_descriptor(&item);
        assert_eq!(descriptor.name, "flow.login");
        assert!(descriptor.input_schema.properties.contains_key("username"));
        assert!(descriptor.input_schema.properties.contains_key("tabTarget"));
        assert_eq!(descriptor.input_schema.required, vec!["username"]);
    }

    #[test]
    fn enum_rules_take_precedence_over_declared_type() {
        let variable = FlowVariable {
            key: "env".to_string(),
            var_type: Some("string".to_string()),
            rules: FlowVariableRule {
                required: false,
                enum_values: vec!["staging".to_string(), "prod".to_string()],
            },
        };
        let schema = variable_to_schema_property(&variable);
        assert_eq!(schema["enum"], json!(["staging", "prod"]));
    }

    #[test]
    fn find_flow_by_slug_matches_suffix() {
        let items = vec![FlowItem {
            id: 7,
            slug: "checkout".to_string(),
            description: None,
            variables: vec![],
            meta: None,
        }];
        assert!(find_flow_by_slug(&items, "flow.checkout").is_some());
        assert!(find_flow_by_slug(&items, "flow.nope").is_none());
        assert!(find_flow_by_slug(&items, "record_replay_flow_run").is_none());
    }
}
