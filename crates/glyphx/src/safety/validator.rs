//! Static validation of shell commands and file paths.

use std::path::Path;

use regex_lite::Regex;
use thiserror::Error;

use super::config::SafetyConfig;
use crate::paths::resolve_path;

/// A safety pattern in the configuration failed to compile.
///
/// Validator construction fails rather than skipping the pattern: a deny
/// rule that silently disappears would weaken the policy.
#[derive(Debug, Error)]
#[error("invalid safety pattern `{pattern}`: {message}")]
pub struct PatternError {
    /// The pattern as written in the configuration.
    pub pattern: String,
    /// The regex engine's complaint.
    pub message: String,
}

/// The outcome of a validation check.
///
/// The reason is populated on acceptance too ("command validated", "safety
/// checks disabled") so that audit logs and tests can see why a check
/// passed, not just that it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the operation is intrinsically acceptable under the policy.
    pub allowed: bool,
    /// Human-readable explanation, always populated.
    pub reason: String,
}

impl Verdict {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }

    /// Returns true if the operation was accepted.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }
}

/// Compiled pattern alongside its configured source text, so denial reasons
/// can name the pattern that matched.
#[derive(Debug)]
struct DenyRule {
    source: String,
    regex: Regex,
}

/// Validates shell commands and file paths against a [`SafetyConfig`].
///
/// Pure rule evaluation: no interactive escalation happens here. The
/// confirmation flow for soft denials lives in
/// [`ConfirmationBroker`](super::ConfirmationBroker).
#[derive(Debug)]
pub struct SafetyValidator {
    config: SafetyConfig,
    denied_commands: Vec<DenyRule>,
    denied_paths: Vec<DenyRule>,
}

fn compile_rules(patterns: &[String]) -> Result<Vec<DenyRule>, PatternError> {
    patterns
        .iter()
        .map(|pattern| {
            // Inline flag for the case-insensitive search the policy promises.
            Regex::new(&format!("(?i){pattern}"))
                .map(|regex| DenyRule {
                    source: pattern.clone(),
                    regex,
                })
                .map_err(|err| PatternError {
                    pattern: pattern.clone(),
                    message: err.to_string(),
                })
        })
        .collect()
}

impl SafetyValidator {
    /// Compile the configuration's deny patterns and build a validator.
    pub fn new(config: SafetyConfig) -> Result<Self, PatternError> {
        let denied_commands = compile_rules(&config.shell_denied_patterns)?;
        let denied_paths = compile_rules(&config.file_denied_paths)?;
        Ok(Self {
            config,
            denied_commands,
            denied_paths,
        })
    }

    /// The configuration this validator enforces.
    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Validate a shell command against the static policy.
    ///
    /// Deny patterns run first, against the raw untokenized command, so a
    /// compound command can be rejected even when its leading token is
    /// allowlisted. The allowlist check then uses a naive whitespace
    /// tokenizer; for compound commands it falls back to the tokens of the
    /// first pipeline/chain segment (text before the first `|`, `&`, or
    /// `;`). That fallback is a heuristic, not a shell parser: later chain
    /// segments are not re-validated.
    pub fn validate_shell_command(&self, command: &str) -> Verdict {
        if !self.config.enabled {
            return Verdict::allow("safety checks disabled");
        }

        for rule in &self.denied_commands {
            if rule.regex.is_match(command) {
                return Verdict::deny(format!(
                    "command matches denied pattern: {}",
                    rule.source
                ));
            }
        }

        let Some(first_token) = command.split_whitespace().next() else {
            return Verdict::deny("empty command");
        };
        let base = base_command_name(first_token);

        if !self.config.shell_allowed_commands.is_empty()
            && !self.config.shell_allowed_commands.contains(&base)
        {
            let first_segment = command
                .split(['|', '&', ';'])
                .next()
                .unwrap_or("");
            let any_allowed = first_segment.split_whitespace().any(|token| {
                self.config
                    .shell_allowed_commands
                    .contains(&base_command_name(token))
            });
            if !any_allowed {
                return Verdict::deny(format!("command '{base}' not in allowed list"));
            }
        }

        Verdict::allow("command validated")
    }

    /// Validate a file path for reading (`write = false`) or writing.
    ///
    /// The path is resolved to canonical absolute form first; the jail,
    /// deny-pattern, extension, and read-size checks all run against the
    /// resolved path so `..` tricks and symlinks into forbidden territory
    /// are caught where the filesystem lets us see them.
    pub fn validate_file_path(&self, path: &Path, write: bool) -> Verdict {
        if !self.config.enabled {
            return Verdict::allow("safety checks disabled");
        }

        let resolved = match resolve_path(path) {
            Ok(resolved) => resolved,
            Err(err) => return Verdict::deny(format!("invalid path: {err}")),
        };

        if let Some(jail) = &self.config.file_jail_dir {
            let jail_resolved = match resolve_path(jail) {
                Ok(resolved) => resolved,
                Err(err) => return Verdict::deny(format!("invalid jail directory: {err}")),
            };
            if !resolved.starts_with(&jail_resolved) {
                return Verdict::deny(format!(
                    "path outside jail directory: {}",
                    jail_resolved.display()
                ));
            }
        }

        let path_str = resolved.to_string_lossy();
        for rule in &self.denied_paths {
            if rule.regex.is_match(&path_str) {
                return Verdict::deny(format!("path matches denied pattern: {}", rule.source));
            }
        }

        if write && !self.config.file_allowed_extensions.is_empty() {
            let extension = resolved
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
                .unwrap_or_default();
            if !self.config.file_allowed_extensions.contains(&extension) {
                return Verdict::deny(format!(
                    "file type '{extension}' not allowed for writing"
                ));
            }
        }

        if !write
            && let Ok(metadata) = resolved.metadata()
            && metadata.len() > self.config.file_max_read_bytes
        {
            return Verdict::deny(format!("file too large: {} bytes", metadata.len()));
        }

        Verdict::allow("path validated")
    }
}

/// Lowercased base name of a command token, with any path prefix stripped so
/// `/bin/rm` and `rm` are treated identically.
fn base_command_name(token: &str) -> String {
    let lowered = token.to_lowercase();
    lowered
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(&lowered)
        .to_string()
}
