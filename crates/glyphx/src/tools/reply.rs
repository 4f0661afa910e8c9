//! Structured tool results and their transcript rendering.

use std::path::PathBuf;

use serde_json::{Value, json};
use thiserror::Error;

use crate::registry::Glyph;

/// The privileged tools the dispatcher knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Execute a shell command.
    RunShell,
    /// Run a saved glyph by id or name.
    RunGlyph,
    /// Read a UTF-8 text file.
    ReadFile,
    /// Write UTF-8 content to a file.
    WriteFile,
    /// List non-hidden entries of a directory.
    ListFiles,
    /// Enumerate saved glyphs. Carries no safety implications.
    ListGlyphs,
}

impl ToolKind {
    /// The wire name of the tool.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RunShell => "run_shell",
            Self::RunGlyph => "run_glyph",
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::ListFiles => "list_files",
            Self::ListGlyphs => "list_glyphs",
        }
    }

    /// Parse a wire name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "run_shell" => Some(Self::RunShell),
            "run_glyph" => Some(Self::RunGlyph),
            "read_file" => Some(Self::ReadFile),
            "write_file" => Some(Self::WriteFile),
            "list_files" => Some(Self::ListFiles),
            "list_glyphs" => Some(Self::ListGlyphs),
            _ => None,
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller error: the request itself was malformed.
///
/// Distinct from policy rejections and operational failures, which are
/// returned in-band as [`ToolReply`] variants so a model loop can react to
/// them. There is no in-band recovery from a bad tool name or argument
/// shape, so these surface as `Err` to the immediate caller.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool with this name exists.
    #[error("unknown tool {0}")]
    UnknownTool(String),
    /// A required argument is missing, has the wrong type, or the raw
    /// argument payload is not valid JSON.
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments {
        /// The tool being invoked.
        tool: String,
        /// What was wrong.
        message: String,
    },
    /// The bridge was invoked from within an in-flight tool execution,
    /// e.g. from inside a confirmation callback.
    #[error("re-entrant tool execution")]
    Reentrant,
}

/// Result of a shell execution (also used for glyph runs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellResult {
    /// `"shell"` for direct commands, `"glyph:<name>"` for glyph runs.
    pub label: String,
    /// Exit code of the subprocess; `-1` when terminated by signal.
    pub exit_code: i32,
    /// Captured stdout, truncated to the output cap.
    pub stdout: String,
    /// Captured stderr, truncated to the output cap.
    pub stderr: String,
}

/// Result of a file read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    /// Resolved path that was read.
    pub path: PathBuf,
    /// File content, truncated to the output cap.
    pub content: String,
}

/// Result of a file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// Resolved path that was written.
    pub path: PathBuf,
    /// Bytes written to disk.
    pub bytes_written: u64,
}

/// Result of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResult {
    /// Resolved directory path.
    pub path: PathBuf,
    /// Entry names, hidden entries excluded, sorted.
    pub entries: Vec<String>,
}

/// Successful payload of a tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Shell or glyph execution output.
    Shell(ShellResult),
    /// File content.
    Read(ReadResult),
    /// Write receipt.
    Write(WriteResult),
    /// Directory entries.
    List(ListResult),
    /// Saved glyphs.
    Glyphs(Vec<Glyph>),
}

/// The dispatcher's boundary contract: always a structured result.
///
/// Policy denials and environmental failures are ordinary variants, never
/// panics or errors, so a model-driven loop receives them as information
/// it can adapt to. Only malformed input escapes as
/// [`ToolError`].
#[derive(Debug, Clone, PartialEq)]
pub enum ToolReply {
    /// The operation ran; its output is attached.
    Completed(ToolOutput),
    /// The policy or the human said no.
    Denied {
        /// Which tool was refused.
        tool: ToolKind,
        /// Why, human-readable.
        reason: String,
    },
    /// The operation was permitted but the OS said no (missing file,
    /// subprocess timeout, permission error, ...).
    Failed {
        /// Which tool failed.
        tool: ToolKind,
        /// What went wrong, human-readable.
        reason: String,
    },
}

impl ToolReply {
    /// Whether this reply is a policy/user denial.
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    /// Whether this reply is an operational failure.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Render the reply as the flat JSON record fed back to the model and
    /// shown in chat transcripts.
    ///
    /// Denials and failures are embedded in the per-tool field
    /// conventions: `returncode "-1"` with the reason in `stderr` for
    /// shell runs, the reason in `content` for reads, `bytes "0"` plus an
    /// `error` field for writes. The sentinel strings live only here; the
    /// typed variants above are the API.
    pub fn into_payload(self) -> Value {
        match self {
            Self::Completed(ToolOutput::Shell(result)) => json!({
                "label": result.label,
                "returncode": result.exit_code.to_string(),
                "stdout": result.stdout,
                "stderr": result.stderr,
            }),
            Self::Completed(ToolOutput::Read(result)) => json!({
                "path": result.path.to_string_lossy(),
                "content": result.content,
            }),
            Self::Completed(ToolOutput::Write(result)) => json!({
                "path": result.path.to_string_lossy(),
                "bytes": result.bytes_written.to_string(),
            }),
            Self::Completed(ToolOutput::List(result)) => json!({
                "path": result.path.to_string_lossy(),
                "entries": result.entries,
            }),
            Self::Completed(ToolOutput::Glyphs(glyphs)) => json!({ "glyphs": glyphs }),
            Self::Denied { tool, reason } => {
                Self::error_payload(tool, format!("Blocked by safety policy: {reason}"))
            }
            Self::Failed { tool, reason } => Self::error_payload(tool, reason),
        }
    }

    fn error_payload(tool: ToolKind, message: String) -> Value {
        match tool {
            ToolKind::RunShell | ToolKind::RunGlyph => json!({
                "label": tool.as_str(),
                "returncode": "-1",
                "stdout": "",
                "stderr": message,
            }),
            ToolKind::ReadFile => json!({
                "content": format!("[error] {message}"),
            }),
            ToolKind::WriteFile => json!({
                "bytes": "0",
                "error": message,
            }),
            ToolKind::ListFiles | ToolKind::ListGlyphs => json!({
                "error": message,
            }),
        }
    }
}
