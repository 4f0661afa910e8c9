//! The tool-call loop: drive a model until it answers in text.

use thiserror::Error;

use super::client::{ChatMessage, ModelClient, ModelTurn};
use crate::safety::truncate_tool_payload;
use crate::tools::ToolsBridge;

/// Default ceiling on model turns per user request.
pub const DEFAULT_MAX_STEPS: usize = 8;

const ARGUMENT_PREVIEW_CHARS: usize = 200;

/// Errors from the loop driver itself.
///
/// Tool denials and failures never surface here; they go back to the model
/// as tool messages. Only the conversation-level machinery can fail.
#[derive(Debug, Error)]
pub enum LoopError {
    /// The model backend failed (transport, protocol, provider error).
    #[error("model request failed: {0}")]
    Model(String),
    /// The model kept calling tools past the step ceiling.
    #[error("model exceeded tool-call step limit ({0} steps)")]
    StepLimit(usize),
}

/// Outcome of a completed loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopReply {
    /// The model's final text answer.
    pub reply: String,
    /// Model turns consumed, including the final one.
    pub steps: usize,
}

/// Run the tool-call loop over `conversation` until the model replies in
/// text or `max_steps` turns elapse.
///
/// Each requested tool call is dispatched through `bridge`; its reply is
/// serialized, capped with [`truncate_tool_payload`], and appended as a
/// `tool` message. Malformed calls (unknown tool, bad arguments) are fed
/// back in-band as `{"error": ...}` so the model can correct itself
/// rather than aborting the conversation. Appends the final assistant
/// message before returning.
pub async fn run_tool_loop(
    client: &dyn ModelClient,
    bridge: &ToolsBridge,
    conversation: &mut Vec<ChatMessage>,
    max_steps: usize,
) -> Result<LoopReply, LoopError> {
    let tools = bridge.tool_definitions();
    for step in 1..=max_steps {
        tracing::info!(step, messages = conversation.len(), "chat step");
        match client.complete(conversation, &tools).await? {
            ModelTurn::Reply(reply) => {
                conversation.push(ChatMessage::assistant(reply.clone()));
                return Ok(LoopReply { reply, steps: step });
            }
            ModelTurn::ToolCalls { assistant, calls } => {
                conversation.push(assistant);
                for call in calls {
                    tracing::info!(
                        name = %call.name,
                        arguments = %preview(&call.arguments),
                        "tool invocation"
                    );
                    let content = match bridge.execute_text(&call.name, &call.arguments).await {
                        Ok(reply) => reply.into_payload().to_string(),
                        Err(err) => {
                            tracing::warn!(name = %call.name, error = %err, "tool input error");
                            serde_json::json!({ "error": err.to_string() }).to_string()
                        }
                    };
                    let cap = bridge.output_cap();
                    conversation.push(ChatMessage::tool(
                        call.name,
                        call.id,
                        truncate_tool_payload(&content, cap),
                    ));
                }
            }
        }
    }
    Err(LoopError::StepLimit(max_steps))
}

fn preview(arguments: &str) -> String {
    if arguments.chars().count() > ARGUMENT_PREVIEW_CHARS {
        let cut: String = arguments.chars().take(ARGUMENT_PREVIEW_CHARS).collect();
        format!("{cut}…")
    } else {
        arguments.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::agent::ToolCallRequest;
    use crate::safety::SafetyConfig;
    use crate::tools::ToolDefinition;

    /// Plays back a fixed sequence of turns.
    struct ScriptedClient {
        turns: Mutex<Vec<ModelTurn>>,
    }

    impl ScriptedClient {
        fn new(turns: Vec<ModelTurn>) -> Self {
            Self {
                turns: Mutex::new(turns),
            }
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<ModelTurn, LoopError> {
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                return Err(LoopError::Model("script exhausted".to_string()));
            }
            Ok(turns.remove(0))
        }
    }

    fn tool_calls_turn(calls: Vec<ToolCallRequest>) -> ModelTurn {
        ModelTurn::ToolCalls {
            assistant: ChatMessage {
                role: "assistant".to_string(),
                ..ChatMessage::default()
            },
            calls,
        }
    }

    fn bridge() -> ToolsBridge {
        ToolsBridge::builder()
            .safety(SafetyConfig::disabled())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_text_reply_ends_loop() {
        let client = ScriptedClient::new(vec![ModelTurn::Reply("done".to_string())]);
        let bridge = bridge();
        let mut conversation = vec![ChatMessage::user("hi")];

        let outcome = run_tool_loop(&client, &bridge, &mut conversation, 4)
            .await
            .unwrap();
        assert_eq!(outcome.reply, "done");
        assert_eq!(outcome.steps, 1);
        assert_eq!(conversation.last().unwrap().role, "assistant");
    }

    #[tokio::test]
    async fn test_tool_call_result_appended_as_tool_message() {
        let client = ScriptedClient::new(vec![
            tool_calls_turn(vec![ToolCallRequest {
                id: Some("call_1".to_string()),
                name: "run_shell".to_string(),
                arguments: json!({"command": "echo hi"}).to_string(),
            }]),
            ModelTurn::Reply("it said hi".to_string()),
        ]);
        let bridge = bridge();
        let mut conversation = vec![ChatMessage::user("run echo")];

        let outcome = run_tool_loop(&client, &bridge, &mut conversation, 4)
            .await
            .unwrap();
        assert_eq!(outcome.steps, 2);

        let tool_msg = conversation
            .iter()
            .find(|msg| msg.role == "tool")
            .unwrap();
        assert_eq!(tool_msg.name.as_deref(), Some("run_shell"));
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        let payload: serde_json::Value =
            serde_json::from_str(tool_msg.content.as_deref().unwrap()).unwrap();
        assert_eq!(payload["returncode"], "0");
        assert_eq!(payload["stdout"], "hi\n");
    }

    #[tokio::test]
    async fn test_unknown_tool_fed_back_in_band() {
        let client = ScriptedClient::new(vec![
            tool_calls_turn(vec![ToolCallRequest {
                id: None,
                name: "summon_demon".to_string(),
                arguments: "{}".to_string(),
            }]),
            ModelTurn::Reply("my mistake".to_string()),
        ]);
        let bridge = bridge();
        let mut conversation = vec![ChatMessage::user("go")];

        let outcome = run_tool_loop(&client, &bridge, &mut conversation, 4)
            .await
            .unwrap();
        assert_eq!(outcome.reply, "my mistake");

        let tool_msg = conversation
            .iter()
            .find(|msg| msg.role == "tool")
            .unwrap();
        let payload: serde_json::Value =
            serde_json::from_str(tool_msg.content.as_deref().unwrap()).unwrap();
        assert!(payload["error"]
            .as_str()
            .unwrap()
            .contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_step_limit_is_typed_error() {
        let looping = tool_calls_turn(vec![ToolCallRequest {
            id: None,
            name: "list_glyphs".to_string(),
            arguments: String::new(),
        }]);
        let client = ScriptedClient::new(vec![
            looping.clone(),
            looping.clone(),
            looping,
        ]);
        let bridge = bridge();
        let mut conversation = vec![ChatMessage::user("loop forever")];

        let err = run_tool_loop(&client, &bridge, &mut conversation, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, LoopError::StepLimit(3)));
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let client = ScriptedClient::new(vec![]);
        let bridge = bridge();
        let mut conversation = vec![ChatMessage::user("hi")];

        let err = run_tool_loop(&client, &bridge, &mut conversation, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, LoopError::Model(_)));
    }
}
