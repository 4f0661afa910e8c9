//! The tool dispatcher: the single entry point for privileged operations.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::{Value, json};

use super::reply::{
    ListResult, ReadResult, ShellResult, ToolError, ToolKind, ToolOutput, ToolReply, WriteResult,
};
use super::schema::{ToolDefinition, builtin_tool_definitions};
use crate::paths::resolve_path;
use crate::registry::GlyphRegistry;
use crate::safety::{
    ConfirmationApprover, ConfirmationBroker, PatternError, Resolution, SafetyConfig,
    SafetyValidator, truncate_output,
};

/// The only mode in which a validator rejection escalates to interactive
/// confirmation. Any other label is treated as autonomous: soft denials
/// become hard ones.
const INTERACTIVE_MODE: &str = "chat";

const MIN_SHELL_TIMEOUT_SECS: f64 = 1.0;
const MAX_SHELL_TIMEOUT_SECS: f64 = 3600.0;
const DEFAULT_SHELL_TIMEOUT_SECS: f64 = 600.0;

/// Builder for a [`ToolsBridge`].
pub struct ToolsBridgeBuilder {
    config: SafetyConfig,
    approver: Option<Arc<dyn ConfirmationApprover>>,
    registry: Option<Arc<GlyphRegistry>>,
    default_timeout: Duration,
}

impl std::fmt::Debug for ToolsBridgeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsBridgeBuilder")
            .field("config", &self.config)
            .field("has_approver", &self.approver.is_some())
            .field("has_registry", &self.registry.is_some())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl ToolsBridgeBuilder {
    fn new() -> Self {
        Self {
            config: SafetyConfig::default(),
            approver: None,
            registry: None,
            default_timeout: Duration::from_secs_f64(DEFAULT_SHELL_TIMEOUT_SECS),
        }
    }

    /// Set the safety configuration (defaults to the shipped policy).
    pub fn safety(mut self, config: SafetyConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the interactive confirmation surface.
    pub fn approver(mut self, approver: Arc<dyn ConfirmationApprover>) -> Self {
        self.approver = Some(approver);
        self
    }

    /// Attach a glyph registry (defaults to an empty in-memory one).
    pub fn registry(mut self, registry: Arc<GlyphRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Default shell timeout used when the caller supplies none.
    /// Clamped to the same `[1, 3600]` second range as caller timeouts.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Compile the policy patterns and build the bridge.
    pub fn build(self) -> Result<ToolsBridge, PatternError> {
        let validator = SafetyValidator::new(self.config)?;
        let default_timeout = Duration::from_secs_f64(
            self.default_timeout
                .as_secs_f64()
                .clamp(MIN_SHELL_TIMEOUT_SECS, MAX_SHELL_TIMEOUT_SECS),
        );
        Ok(ToolsBridge {
            validator,
            broker: ConfirmationBroker::new(self.approver),
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(GlyphRegistry::in_memory())),
            mode: RwLock::new(INTERACTIVE_MODE.to_string()),
            default_timeout,
            in_flight: AtomicBool::new(false),
        })
    }
}

/// Exposes glyph, shell, and file tools to a language model, gated by the
/// safety layer.
///
/// One bridge is one session: the approval cache lives and dies with it.
/// Each invocation runs to completion before the next; hosts invoking the
/// bridge from multiple tasks must serialize calls themselves (the bridge
/// rejects overlap with [`ToolError::Reentrant`] rather than interleaving).
pub struct ToolsBridge {
    validator: SafetyValidator,
    broker: ConfirmationBroker,
    registry: Arc<GlyphRegistry>,
    mode: RwLock<String>,
    default_timeout: Duration,
    in_flight: AtomicBool,
}

impl std::fmt::Debug for ToolsBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsBridge")
            .field("mode", &self.mode())
            .field("broker", &self.broker)
            .field("glyphs", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Clears the in-flight flag when an invocation completes.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, ToolError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| Self(flag))
            .map_err(|_| ToolError::Reentrant)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ToolsBridge {
    /// Start building a bridge.
    pub fn builder() -> ToolsBridgeBuilder {
        ToolsBridgeBuilder::new()
    }

    /// Schemas of the built-in tools, for handing to a model client.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        builtin_tool_definitions()
    }

    /// The configured byte cap for tool output fields.
    pub fn output_cap(&self) -> usize {
        self.validator.config().max_output_bytes
    }

    /// Set the caller mode (`"chat"`, `"agent"`, or any label). Only
    /// `"chat"` permits interactive escalation of soft denials.
    pub fn set_mode(&self, mode: impl Into<String>) {
        if let Ok(mut current) = self.mode.write() {
            *current = mode.into();
        }
    }

    /// The current caller mode.
    pub fn mode(&self) -> String {
        self.mode
            .read()
            .map(|mode| mode.clone())
            .unwrap_or_else(|_| INTERACTIVE_MODE.to_string())
    }

    /// Dispatch a tool request with pre-parsed arguments.
    ///
    /// Returns `Err` only for malformed input (unknown tool, bad argument
    /// shape, re-entrant call); denials and operational failures come back
    /// as in-band [`ToolReply`] variants.
    pub async fn execute(&self, name: &str, arguments: &Value) -> Result<ToolReply, ToolError> {
        let kind = ToolKind::parse(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        match kind {
            ToolKind::ListGlyphs => Ok(self.list_glyphs_inner()),
            ToolKind::RunGlyph => {
                let identifier = require_str(arguments, "identifier", kind)?;
                Ok(self.run_glyph_inner(identifier).await)
            }
            ToolKind::RunShell => {
                let command = require_str(arguments, "command", kind)?;
                let cwd = optional_str(arguments, "cwd").map(PathBuf::from);
                let timeout = arguments.get("timeout").and_then(Value::as_f64);
                Ok(self
                    .run_shell_inner(command, cwd.as_deref(), timeout, None, kind)
                    .await)
            }
            ToolKind::ReadFile => {
                let path = require_str(arguments, "path", kind)?;
                Ok(self.read_file_inner(Path::new(path)).await)
            }
            ToolKind::WriteFile => {
                let path = require_str(arguments, "path", kind)?;
                let content = require_str(arguments, "content", kind)?;
                Ok(self.write_file_inner(Path::new(path), content).await)
            }
            ToolKind::ListFiles => {
                let path = require_str(arguments, "path", kind)?;
                Ok(self.list_files_inner(Path::new(path)).await)
            }
        }
    }

    /// Dispatch a tool request with a raw JSON argument string, as
    /// delivered by a model. An empty/blank string means no arguments;
    /// anything else must parse as a JSON object.
    pub async fn execute_text(&self, name: &str, arguments: &str) -> Result<ToolReply, ToolError> {
        let parsed = if arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(arguments).map_err(|err| ToolError::InvalidArguments {
                tool: name.to_string(),
                message: format!("invalid JSON arguments: {err}"),
            })?
        };
        self.execute(name, &parsed).await
    }

    /// Execute a shell command through the safety layer.
    pub async fn run_shell(
        &self,
        command: &str,
        cwd: Option<&Path>,
        timeout_secs: Option<f64>,
    ) -> Result<ToolReply, ToolError> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        Ok(self
            .run_shell_inner(command, cwd, timeout_secs, None, ToolKind::RunShell)
            .await)
    }

    /// Run a saved glyph by id or case-insensitive name.
    pub async fn run_glyph(&self, identifier: &str) -> Result<ToolReply, ToolError> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        Ok(self.run_glyph_inner(identifier).await)
    }

    /// Read a UTF-8 text file through the safety layer.
    pub async fn read_file(&self, path: &Path) -> Result<ToolReply, ToolError> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        Ok(self.read_file_inner(path).await)
    }

    /// Write UTF-8 content to a file through the safety layer.
    pub async fn write_file(&self, path: &Path, content: &str) -> Result<ToolReply, ToolError> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        Ok(self.write_file_inner(path, content).await)
    }

    /// List the non-hidden entries of a directory, sorted by name.
    pub async fn list_files(&self, path: &Path) -> Result<ToolReply, ToolError> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        Ok(self.list_files_inner(path).await)
    }

    /// Enumerate saved glyphs. Bypasses validation: listing carries no
    /// safety implications.
    pub fn list_glyphs(&self) -> Result<ToolReply, ToolError> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        Ok(self.list_glyphs_inner())
    }

    // ---- handlers -------------------------------------------------------

    async fn run_shell_inner(
        &self,
        command: &str,
        cwd: Option<&Path>,
        timeout_secs: Option<f64>,
        label: Option<String>,
        kind: ToolKind,
    ) -> ToolReply {
        let label = label.unwrap_or_else(|| "shell".to_string());
        let verdict = self.validator.validate_shell_command(command);
        let confirm_args = json!({
            "command": command,
            "cwd": cwd.map(|p| p.to_string_lossy().into_owned()),
        });
        if let Some(reason) = self.authorize(kind, &verdict, &confirm_args) {
            tracing::warn!(command, %reason, "run_shell blocked");
            return ToolReply::Denied { tool: kind, reason };
        }

        let timeout = self.clamp_timeout(timeout_secs);
        let cwd = match cwd.map(resolve_path).transpose() {
            Ok(cwd) => cwd,
            Err(err) => {
                return ToolReply::Failed {
                    tool: kind,
                    reason: format!("invalid working directory: {err}"),
                };
            }
        };
        tracing::info!(
            command,
            ?cwd,
            timeout_secs = timeout.as_secs_f64(),
            %label,
            "run_shell"
        );

        let mut shell = shell_command(command);
        if let Some(dir) = &cwd {
            shell.current_dir(dir);
        }
        shell
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, shell.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return ToolReply::Failed {
                    tool: kind,
                    reason: format!("failed to run command: {err}"),
                };
            }
            Err(_) => {
                // kill_on_drop reaps the subprocess when the future drops.
                return ToolReply::Failed {
                    tool: kind,
                    reason: format!("command timed out after {}s", timeout.as_secs()),
                };
            }
        };

        let cap = self.validator.config().max_output_bytes;
        ToolReply::Completed(ToolOutput::Shell(ShellResult {
            label,
            exit_code: output.status.code().unwrap_or(-1),
            stdout: truncate_output(&String::from_utf8_lossy(&output.stdout), cap).into_owned(),
            stderr: truncate_output(&String::from_utf8_lossy(&output.stderr), cap).into_owned(),
        }))
    }

    async fn run_glyph_inner(&self, identifier: &str) -> ToolReply {
        let Some(glyph) = self.registry.find(identifier) else {
            return ToolReply::Failed {
                tool: ToolKind::RunGlyph,
                reason: format!("unknown glyph {identifier}"),
            };
        };
        tracing::info!(glyph = %glyph.name, id = %glyph.id, "run_glyph");
        self.run_shell_inner(
            &glyph.cmd,
            glyph.cwd.as_deref(),
            None,
            Some(format!("glyph:{}", glyph.name)),
            ToolKind::RunGlyph,
        )
        .await
    }

    async fn read_file_inner(&self, path: &Path) -> ToolReply {
        let kind = ToolKind::ReadFile;
        let verdict = self.validator.validate_file_path(path, false);
        let confirm_args = json!({ "path": path.to_string_lossy() });
        if let Some(reason) = self.authorize(kind, &verdict, &confirm_args) {
            tracing::warn!(path = %path.display(), %reason, "read_file blocked");
            return ToolReply::Denied { tool: kind, reason };
        }

        let resolved = match resolve_path(path) {
            Ok(resolved) => resolved,
            Err(err) => {
                return ToolReply::Failed {
                    tool: kind,
                    reason: format!("invalid path: {err}"),
                };
            }
        };
        tracing::info!(path = %resolved.display(), "read_file");
        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => {
                let cap = self.validator.config().max_output_bytes;
                ToolReply::Completed(ToolOutput::Read(ReadResult {
                    path: resolved,
                    content: truncate_output(&content, cap).into_owned(),
                }))
            }
            Err(err) => ToolReply::Failed {
                tool: kind,
                reason: format!("failed to read {}: {err}", resolved.display()),
            },
        }
    }

    async fn write_file_inner(&self, path: &Path, content: &str) -> ToolReply {
        let kind = ToolKind::WriteFile;
        let verdict = self.validator.validate_file_path(path, true);
        let confirm_args = json!({
            "path": path.to_string_lossy(),
            "content": content,
        });
        if let Some(reason) = self.authorize(kind, &verdict, &confirm_args) {
            tracing::warn!(path = %path.display(), %reason, "write_file blocked");
            return ToolReply::Denied { tool: kind, reason };
        }

        let resolved = match resolve_path(path) {
            Ok(resolved) => resolved,
            Err(err) => {
                return ToolReply::Failed {
                    tool: kind,
                    reason: format!("invalid path: {err}"),
                };
            }
        };
        if let Some(parent) = resolved.parent()
            && let Err(err) = tokio::fs::create_dir_all(parent).await
        {
            return ToolReply::Failed {
                tool: kind,
                reason: format!("failed to create {}: {err}", parent.display()),
            };
        }
        tracing::info!(path = %resolved.display(), bytes = content.len(), "write_file");
        match tokio::fs::write(&resolved, content).await {
            Ok(()) => ToolReply::Completed(ToolOutput::Write(WriteResult {
                path: resolved,
                bytes_written: content.len() as u64,
            })),
            Err(err) => ToolReply::Failed {
                tool: kind,
                reason: format!("failed to write {}: {err}", resolved.display()),
            },
        }
    }

    async fn list_files_inner(&self, path: &Path) -> ToolReply {
        let kind = ToolKind::ListFiles;
        let resolved = match resolve_path(path) {
            Ok(resolved) => resolved,
            Err(err) => {
                return ToolReply::Failed {
                    tool: kind,
                    reason: format!("invalid path: {err}"),
                };
            }
        };

        let mut reader = match tokio::fs::read_dir(&resolved).await {
            Ok(reader) => reader,
            Err(err) => {
                return ToolReply::Failed {
                    tool: kind,
                    reason: format!("not a directory: {} ({err})", resolved.display()),
                };
            }
        };
        let mut entries = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if !name.starts_with('.') {
                        entries.push(name);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    return ToolReply::Failed {
                        tool: kind,
                        reason: format!("failed to list {}: {err}", resolved.display()),
                    };
                }
            }
        }
        entries.sort();
        tracing::info!(path = %resolved.display(), count = entries.len(), "list_files");
        ToolReply::Completed(ToolOutput::List(ListResult {
            path: resolved,
            entries,
        }))
    }

    fn list_glyphs_inner(&self) -> ToolReply {
        let glyphs = self.registry.list();
        tracing::info!(count = glyphs.len(), "list_glyphs");
        ToolReply::Completed(ToolOutput::Glyphs(glyphs))
    }

    // ---- policy plumbing ------------------------------------------------

    /// Turn a validator verdict into a go/no-go, escalating soft denials
    /// to the confirmation broker when the mode permits. Returns the
    /// denial reason, or `None` to proceed.
    ///
    /// Escalation requires a registered approver: with nobody to ask,
    /// a rejection stays a rejection. The broker's permissive no-approver
    /// fallback is never reached from here.
    fn authorize(
        &self,
        kind: ToolKind,
        verdict: &crate::safety::Verdict,
        arguments: &Value,
    ) -> Option<String> {
        if verdict.is_allowed() {
            return None;
        }
        let mode = self.mode();
        if self.validator.config().require_confirmation
            && mode == INTERACTIVE_MODE
            && self.broker.has_approver()
        {
            match self.broker.resolve(kind.as_str(), arguments, &mode) {
                Resolution::Approved => {
                    tracing::info!(tool = %kind, reason = %verdict.reason, "user approved");
                    None
                }
                Resolution::Denied => Some(format!("denied by user ({})", verdict.reason)),
            }
        } else {
            Some(verdict.reason.clone())
        }
    }

    fn clamp_timeout(&self, requested_secs: Option<f64>) -> Duration {
        match requested_secs {
            Some(secs) => Duration::from_secs_f64(
                secs.clamp(MIN_SHELL_TIMEOUT_SECS, MAX_SHELL_TIMEOUT_SECS),
            ),
            None => self.default_timeout,
        }
    }
}

fn require_str<'a>(arguments: &'a Value, key: &str, tool: ToolKind) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool.as_str().to_string(),
            message: format!("requires '{key}' string"),
        })
}

fn optional_str<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str)
}

#[cfg(windows)]
fn shell_command(command: &str) -> tokio::process::Command {
    let mut shell = tokio::process::Command::new("cmd");
    shell.arg("/C").arg(command);
    shell
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> tokio::process::Command {
    let mut shell = tokio::process::Command::new("sh");
    shell.arg("-c").arg(command);
    shell
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn bridge(config: SafetyConfig) -> ToolsBridge {
        ToolsBridge::builder().safety(config).build().unwrap()
    }

    #[test]
    fn test_mode_round_trip() {
        let bridge = bridge(SafetyConfig::default());
        assert_eq!(bridge.mode(), "chat");
        bridge.set_mode("agent");
        assert_eq!(bridge.mode(), "agent");
    }

    #[test]
    fn test_clamp_timeout() {
        let bridge = bridge(SafetyConfig::default());
        assert_eq!(bridge.clamp_timeout(Some(0.1)), Duration::from_secs(1));
        assert_eq!(bridge.clamp_timeout(Some(5.0)), Duration::from_secs(5));
        assert_eq!(bridge.clamp_timeout(Some(999_999.0)), Duration::from_secs(3600));
        assert_eq!(bridge.clamp_timeout(None), Duration::from_secs(600));
    }

    #[test]
    fn test_default_timeout_is_clamped_at_build() {
        let bridge = ToolsBridge::builder()
            .default_timeout(Duration::from_secs(100_000))
            .build()
            .unwrap();
        assert_eq!(bridge.clamp_timeout(None), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_input_error() {
        let bridge = bridge(SafetyConfig::disabled());
        let err = bridge.execute("format_disk", &json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_missing_required_argument_is_input_error() {
        let bridge = bridge(SafetyConfig::disabled());
        let err = bridge.execute("run_shell", &json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_execute_text_rejects_bad_json() {
        let bridge = bridge(SafetyConfig::disabled());
        let err = bridge
            .execute_text("run_shell", "{not json")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_execute_text_blank_arguments_means_empty_object() {
        let bridge = bridge(SafetyConfig::disabled());
        let reply = bridge.execute_text("list_glyphs", "  ").await.unwrap();
        assert!(matches!(
            reply,
            ToolReply::Completed(ToolOutput::Glyphs(_))
        ));
    }
}
