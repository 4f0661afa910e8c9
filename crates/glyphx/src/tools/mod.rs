//! Tool dispatch: the bridge between a model's tool calls and the host.

mod bridge;
mod reply;
mod schema;

pub use bridge::{ToolsBridge, ToolsBridgeBuilder};
pub use reply::{
    ListResult, ReadResult, ShellResult, ToolError, ToolKind, ToolOutput, ToolReply, WriteResult,
};
pub use schema::{ToolDefinition, builtin_tool_definitions};
