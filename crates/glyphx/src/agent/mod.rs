//! Model-driven tool calling.
//!
//! [`ModelClient`] abstracts the chat-completion backend;
//! [`run_tool_loop`] drives it against a
//! [`ToolsBridge`](crate::tools::ToolsBridge) until the model produces a
//! text reply or hits the step ceiling.

mod client;
mod runner;

pub use client::{ChatMessage, ModelClient, ModelTurn, ToolCallRequest};
pub use runner::{DEFAULT_MAX_STEPS, LoopError, LoopReply, run_tool_loop};
