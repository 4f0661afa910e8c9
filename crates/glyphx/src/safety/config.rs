//! Safety configuration for tool execution.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Policy configuration for privileged tool execution.
///
/// Constructed once per [`ToolsBridge`](crate::tools::ToolsBridge) instance
/// and immutable thereafter; a settings change means building a new bridge,
/// never mutating this in place.
///
/// Denied patterns always take precedence over allow rules. Setting
/// `enabled = false` is the only bypass: every check passes trivially.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Master kill switch. When false, all validation passes.
    pub enabled: bool,
    /// Whether a validator rejection may escalate to interactive
    /// confirmation (soft deny) instead of failing outright (hard deny).
    pub require_confirmation: bool,
    /// Base-command allowlist for shell execution. An empty set disables
    /// allowlist enforcement (deny-pattern-only mode).
    pub shell_allowed_commands: HashSet<String>,
    /// Regex patterns checked against the raw command string before the
    /// allowlist. A match always rejects, even for allowlisted commands.
    pub shell_denied_patterns: Vec<String>,
    /// Cap in bytes applied to any returned text (stdout, stderr, file
    /// content). Oversized output is truncated, not rejected.
    pub max_output_bytes: usize,
    /// If set, every file read/write must resolve to a descendant of this
    /// directory after `..`/symlink normalization.
    pub file_jail_dir: Option<PathBuf>,
    /// Maximum size of an existing file permitted for reading. Unlike
    /// `max_output_bytes` this rejects rather than truncates.
    pub file_max_read_bytes: u64,
    /// Extensions (lowercase, with leading dot) permitted for file writes.
    /// An empty set disables the extension check.
    pub file_allowed_extensions: HashSet<String>,
    /// Regex patterns over the canonical path string that always reject,
    /// regardless of jail or extension checks.
    pub file_denied_paths: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            require_confirmation: true,
            shell_allowed_commands: [
                "ls", "dir", "echo", "pwd", "cd", "git", "npm", "pip", "python", "node", "cat",
                "type", "find", "grep", "curl", "wget", "pytest", "make", "cargo", "go", "dotnet",
                "java", "mvn", "gradle",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            shell_denied_patterns: [
                r"rm\s+-rf",
                r"del\s+/f",
                r"format\s+",
                r"shutdown",
                r"reboot",
                r"kill\s+-9",
                r"taskkill\s+/f",
                r"net\s+user",
                r"reg\s+",
                r"mkfs\.",
                r"dd\s+if=",
                r"fdisk",
                r"diskpart",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            max_output_bytes: 50_000,
            file_jail_dir: None,
            file_max_read_bytes: 1_048_576,
            file_allowed_extensions: [
                ".txt", ".md", ".json", ".yml", ".yaml", ".py", ".js", ".ts", ".html", ".css",
                ".csv", ".log", ".conf", ".ini", ".toml", ".xml", ".rst", ".sh", ".bash", ".sql",
                ".c", ".cpp", ".h", ".java", ".go", ".rs", ".rb", ".php", ".pl", ".r", ".m",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            file_denied_paths: [
                r".*\.exe$",
                r".*\.dll$",
                r".*\.sys$",
                r".*\.bat$",
                r".*\.cmd$",
                r".*/System32/.*",
                r".*/Windows/.*",
                r".*/etc/passwd.*",
                r".*\.so$",
                r".*\.dylib$",
                r".*/bin/.*",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        }
    }
}

impl SafetyConfig {
    /// A configuration with all checks disabled.
    ///
    /// Every validation passes. Intended for trusted/headless contexts and
    /// tests; this is not a sandbox escape hatch so much as the absence of
    /// a sandbox.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_shipped_policy() {
        let config = SafetyConfig::default();

        assert!(config.enabled);
        assert!(config.require_confirmation);
        assert!(config.shell_allowed_commands.contains("ls"));
        assert!(config.shell_allowed_commands.contains("cargo"));
        assert!(config.shell_denied_patterns.iter().any(|p| p.contains("rm")));
        assert_eq!(config.max_output_bytes, 50_000);
        assert_eq!(config.file_max_read_bytes, 1_048_576);
        assert!(config.file_allowed_extensions.contains(".rs"));
        assert!(config.file_jail_dir.is_none());
    }

    #[test]
    fn test_disabled_constructor() {
        let config = SafetyConfig::disabled();
        assert!(!config.enabled);
        // The rest of the policy is still populated, just not consulted.
        assert!(!config.shell_denied_patterns.is_empty());
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = SafetyConfig {
            file_jail_dir: Some(PathBuf::from("/tmp/jail")),
            max_output_bytes: 1024,
            ..SafetyConfig::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: SafetyConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.max_output_bytes, 1024);
        assert_eq!(parsed.file_jail_dir, Some(PathBuf::from("/tmp/jail")));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: SafetyConfig = serde_json::from_str(r#"{"enabled": false}"#).unwrap();
        assert!(!parsed.enabled);
        assert_eq!(parsed.max_output_bytes, 50_000);
    }
}
