//! Model-facing tool schemas.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A tool's schema: name, natural-language description, and a JSON Schema
/// for its parameters. Pass-through metadata for the model client; the
/// dispatcher itself validates arguments structurally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (unique identifier).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's parameters.
    #[serde(default)]
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Create a tool definition that takes no parameters.
    pub fn no_params(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(
            name,
            description,
            json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false,
            }),
        )
    }

    /// The OpenAI function-calling wrapper around this definition.
    pub fn as_openai(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            },
        })
    }
}

/// Schemas for the built-in privileged tools.
pub fn builtin_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::no_params(
            "list_glyphs",
            "Return all saved glyphs (id, name, emoji, cmd, cwd).",
        ),
        ToolDefinition::new(
            "run_glyph",
            "Run a saved glyph by id or name (case insensitive).",
            json!({
                "type": "object",
                "properties": {
                    "identifier": {
                        "type": "string",
                        "description": "Glyph id or name.",
                    },
                },
                "required": ["identifier"],
                "additionalProperties": false,
            }),
        ),
        ToolDefinition::new(
            "run_shell",
            "Run a shell command. Prefer glyphs when possible.",
            json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string" },
                    "cwd": {
                        "type": "string",
                        "description": "Optional working directory.",
                    },
                    "timeout": {
                        "type": "number",
                        "description": "Timeout in seconds.",
                        "minimum": 1,
                        "maximum": 3600,
                    },
                },
                "required": ["command"],
                "additionalProperties": false,
            }),
        ),
        ToolDefinition::new(
            "read_file",
            "Read a UTF-8 text file (size capped).",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                },
                "required": ["path"],
                "additionalProperties": false,
            }),
        ),
        ToolDefinition::new(
            "write_file",
            "Write UTF-8 content to a file (overwrites).",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "content": { "type": "string" },
                },
                "required": ["path", "content"],
                "additionalProperties": false,
            }),
        ),
        ToolDefinition::new(
            "list_files",
            "List files in a directory (non-recursive, hides dotfiles).",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                },
                "required": ["path"],
                "additionalProperties": false,
            }),
        ),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtin_tools_present() {
        let names: Vec<_> = builtin_tool_definitions()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "list_glyphs",
                "run_glyph",
                "run_shell",
                "read_file",
                "write_file",
                "list_files",
            ]
        );
    }

    #[test]
    fn test_run_shell_schema_includes_clamped_timeout() {
        let tools = builtin_tool_definitions();
        let run_shell = tools.iter().find(|t| t.name == "run_shell").unwrap();
        let timeout = &run_shell.parameters["properties"]["timeout"];
        assert_eq!(timeout["type"], "number");
        assert_eq!(timeout["minimum"], 1);
        assert_eq!(timeout["maximum"], 3600);
    }

    #[test]
    fn test_openai_wrapper_shape() {
        let tool = ToolDefinition::no_params("list_glyphs", "List them.");
        let wrapped = tool.as_openai();
        assert_eq!(wrapped["type"], "function");
        assert_eq!(wrapped["function"]["name"], "list_glyphs");
        assert!(wrapped["function"]["parameters"]["properties"].is_object());
    }
}
