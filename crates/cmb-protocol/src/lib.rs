//! The wire protocol between the bridge and browser-extension instances
//! (the `Envelope`, spec §3/§4.1/§6.1), plus the MCP-facing tool and
//! session JSON shapes consumed by the dispatcher and tool catalogue.

mod envelope;
pub mod jsonrpc;
mod tools;

pub use envelope::{decode, encode, Envelope, EnvelopeType, ParseError};
pub use jsonrpc::{JsonRpcError, JsonRpcPayload, JsonRpcRequest, JsonRpcResponse};
pub use tools::{
    CallToolParams, CallToolResult, Content, FlowItem, FlowVariable, FlowVariableRule,
    ListPublishedFlowsPayload, ToolDescriptor, ToolInputSchema,
};
