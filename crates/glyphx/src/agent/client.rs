//! The model-client seam: chat messages and the completion trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::runner::LoopError;
use crate::tools::ToolDefinition;

/// One message in an OpenAI-style chat transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `"system"`, `"user"`, `"assistant"`, or `"tool"`.
    pub role: String,
    /// Text content; absent for assistant turns that only call tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool name, on `tool` role messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Correlates a `tool` message with the call that produced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool calls requested by an assistant turn, in wire form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
}

impl ChatMessage {
    /// A system-role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// A user-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// An assistant-role message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// A tool-role message carrying a serialized tool result.
    pub fn tool(
        name: impl Into<String>,
        tool_call_id: Option<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            name: Some(name.into()),
            tool_call_id,
            ..Self::default()
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    /// Provider-assigned call id, echoed back on the tool message.
    pub id: Option<String>,
    /// Tool name.
    pub name: String,
    /// Raw JSON argument string, exactly as the model produced it.
    pub arguments: String,
}

/// One turn of model output: either a final text reply or a batch of tool
/// calls to execute before asking again.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    /// The model answered in text; the loop is done.
    Reply(String),
    /// The model wants tools run. The `assistant` message carries the
    /// turn as the provider emitted it (including `tool_calls`) so the
    /// transcript stays replayable.
    ToolCalls {
        /// The assistant message to append to the transcript.
        assistant: ChatMessage,
        /// The requested invocations, in order.
        calls: Vec<ToolCallRequest>,
    },
}

/// A chat-completion backend.
///
/// Implementations own transport, retries, and provider quirks; the loop
/// driver only sees transcripts in and [`ModelTurn`]s out. Test doubles
/// script a fixed sequence of turns.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Request the next turn for `messages`, offering `tools`.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelTurn, LoopError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_message_serialization_skips_absent_fields() {
        let message = ChatMessage::user("hello");
        let payload = serde_json::to_value(&message).unwrap();
        assert_eq!(payload["role"], "user");
        assert_eq!(payload["content"], "hello");
        assert!(payload.get("name").is_none());
        assert!(payload.get("tool_call_id").is_none());
    }

    #[test]
    fn test_tool_message_carries_call_id() {
        let message = ChatMessage::tool("run_shell", Some("call_1".to_string()), "{}");
        let payload = serde_json::to_value(&message).unwrap();
        assert_eq!(payload["role"], "tool");
        assert_eq!(payload["name"], "run_shell");
        assert_eq!(payload["tool_call_id"], "call_1");
    }
}
