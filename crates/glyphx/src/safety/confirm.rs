//! Interactive confirmation of soft-denied operations.
//!
//! When the validator rejects an operation and the policy allows
//! escalation, the [`ConfirmationBroker`] asks a host-registered
//! [`ConfirmationApprover`] and caches remembered decisions for the
//! lifetime of the owning bridge, so an identical request is never
//! prompted twice in one session.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decision returned by an approver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Permit this operation.
    Allow,
    /// Refuse this operation.
    Deny,
    /// Refuse this operation and every identical repeat, regardless of the
    /// remember flag.
    AlwaysDeny,
}

/// An approver's answer: the decision plus whether to cache it for the
/// rest of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalResponse {
    /// The decision itself.
    pub decision: ApprovalDecision,
    /// Whether to reuse this decision for identical future requests.
    /// [`ApprovalDecision::AlwaysDeny`] is remembered regardless.
    pub remember: bool,
}

impl ApprovalResponse {
    /// Permit the operation.
    pub fn allow(remember: bool) -> Self {
        Self {
            decision: ApprovalDecision::Allow,
            remember,
        }
    }

    /// Refuse the operation.
    pub fn deny(remember: bool) -> Self {
        Self {
            decision: ApprovalDecision::Deny,
            remember,
        }
    }

    /// Refuse the operation and all identical repeats.
    pub fn always_deny() -> Self {
        Self {
            decision: ApprovalDecision::AlwaysDeny,
            remember: true,
        }
    }
}

/// Host-supplied confirmation surface.
///
/// The single method is invoked synchronously from the executing task; the
/// broker applies no timeout of its own, so a blocking UI prompt blocks the
/// tool invocation until answered. Implementations must not call back into
/// the bridge (re-entrant tool execution is rejected there).
pub trait ConfirmationApprover: Send + Sync {
    /// Decide whether `tool` may run with `arguments` in the given mode.
    fn confirm(&self, tool: &str, arguments: &Value, mode: &str) -> ApprovalResponse;
}

/// An approver that permits everything. Useful for headless contexts and
/// tests; pairs with the broker's permissive no-approver fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllApprover;

impl ConfirmationApprover for AllowAllApprover {
    fn confirm(&self, _tool: &str, _arguments: &Value, _mode: &str) -> ApprovalResponse {
        ApprovalResponse::allow(false)
    }
}

/// An approver that refuses everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllApprover;

impl ConfirmationApprover for DenyAllApprover {
    fn confirm(&self, _tool: &str, _arguments: &Value, _mode: &str) -> ApprovalResponse {
        ApprovalResponse::deny(false)
    }
}

/// A remembered decision. `AlwaysDeny` collapses to `Deny` once cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CachedDecision {
    Allow,
    Deny,
}

/// Per-session memory of remembered approval decisions.
///
/// Keyed by tool name plus a hash of the canonical JSON form of the
/// arguments. Entries are never evicted; the cache lives and dies with the
/// bridge that owns it and is never persisted.
#[derive(Debug, Default)]
struct SessionApprovalCache {
    entries: Mutex<HashMap<String, CachedDecision>>,
}

impl SessionApprovalCache {
    fn get(&self, key: &str) -> Option<CachedDecision> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).copied())
    }

    fn remember(&self, key: String, decision: CachedDecision) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, decision);
        }
    }

    fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
}

/// Deterministic cache key for a tool invocation.
///
/// `serde_json` keeps object keys in sorted order, so the serialized
/// arguments are already canonical.
fn cache_key(tool: &str, arguments: &Value) -> String {
    let mut hasher = DefaultHasher::new();
    arguments.to_string().hash(&mut hasher);
    format!("{tool}:{:016x}", hasher.finish())
}

/// The terminal outcome of a confirmation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The operation may proceed.
    Approved,
    /// The operation must not proceed.
    Denied,
}

/// Mediates between a validator rejection and the interactive approver.
pub struct ConfirmationBroker {
    approver: Option<Arc<dyn ConfirmationApprover>>,
    cache: SessionApprovalCache,
}

impl std::fmt::Debug for ConfirmationBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationBroker")
            .field("has_approver", &self.approver.is_some())
            .field("cached_decisions", &self.cache.len())
            .finish()
    }
}

impl ConfirmationBroker {
    /// Create a broker with an optional approver.
    ///
    /// Without an approver every escalation resolves as approved — a
    /// documented permissive fallback for headless and test contexts, not
    /// a security guarantee.
    pub fn new(approver: Option<Arc<dyn ConfirmationApprover>>) -> Self {
        Self {
            approver,
            cache: SessionApprovalCache::default(),
        }
    }

    /// Whether an approver is registered. Callers that treat the
    /// no-approver fallback as too permissive can check this before
    /// escalating.
    pub fn has_approver(&self) -> bool {
        self.approver.is_some()
    }

    /// Resolve an escalated request to approved or denied.
    ///
    /// A cached remembered decision short-circuits without invoking the
    /// approver; otherwise the approver is consulted and its decision
    /// cached when remembered (always, for `AlwaysDeny`).
    pub fn resolve(&self, tool: &str, arguments: &Value, mode: &str) -> Resolution {
        let key = cache_key(tool, arguments);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(tool, %key, ?cached, "confirmation served from session cache");
            return match cached {
                CachedDecision::Allow => Resolution::Approved,
                CachedDecision::Deny => Resolution::Denied,
            };
        }

        let Some(approver) = &self.approver else {
            tracing::warn!(tool, "no confirmation approver registered; allowing");
            return Resolution::Approved;
        };

        let response = approver.confirm(tool, arguments, mode);
        let (decision, remember) = match response.decision {
            ApprovalDecision::Allow => (CachedDecision::Allow, response.remember),
            ApprovalDecision::Deny => (CachedDecision::Deny, response.remember),
            ApprovalDecision::AlwaysDeny => (CachedDecision::Deny, true),
        };
        if remember {
            self.cache.remember(key, decision);
        }
        tracing::info!(tool, mode, ?decision, remember, "confirmation resolved");
        match decision {
            CachedDecision::Allow => Resolution::Approved,
            CachedDecision::Deny => Resolution::Denied,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    /// Counts invocations and returns a fixed response.
    struct CountingApprover {
        calls: AtomicUsize,
        response: ApprovalResponse,
    }

    impl CountingApprover {
        fn new(response: ApprovalResponse) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ConfirmationApprover for CountingApprover {
        fn confirm(&self, _tool: &str, _arguments: &Value, _mode: &str) -> ApprovalResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
        }
    }

    #[test]
    fn test_no_approver_allows() {
        let broker = ConfirmationBroker::new(None);
        let resolution = broker.resolve("run_shell", &json!({"command": "x"}), "chat");
        assert_eq!(resolution, Resolution::Approved);
    }

    #[test]
    fn test_approver_decision_honored() {
        let broker = ConfirmationBroker::new(Some(Arc::new(DenyAllApprover)));
        assert_eq!(
            broker.resolve("run_shell", &json!({"command": "x"}), "chat"),
            Resolution::Denied
        );

        let broker = ConfirmationBroker::new(Some(Arc::new(AllowAllApprover)));
        assert_eq!(
            broker.resolve("run_shell", &json!({"command": "x"}), "chat"),
            Resolution::Approved
        );
    }

    #[test]
    fn test_remembered_decision_not_prompted_again() {
        let approver = Arc::new(CountingApprover::new(ApprovalResponse::allow(true)));
        let broker = ConfirmationBroker::new(Some(approver.clone()));
        let args = json!({"command": "dangerous_command"});

        for _ in 0..5 {
            assert_eq!(broker.resolve("run_shell", &args, "chat"), Resolution::Approved);
        }
        assert_eq!(approver.calls(), 1);
    }

    #[test]
    fn test_unremembered_decision_prompts_every_time() {
        let approver = Arc::new(CountingApprover::new(ApprovalResponse::deny(false)));
        let broker = ConfirmationBroker::new(Some(approver.clone()));
        let args = json!({"command": "dangerous_command"});

        broker.resolve("run_shell", &args, "chat");
        broker.resolve("run_shell", &args, "chat");
        assert_eq!(approver.calls(), 2);
    }

    #[test]
    fn test_always_deny_remembered_without_remember_flag() {
        let approver = Arc::new(CountingApprover::new(ApprovalResponse {
            decision: ApprovalDecision::AlwaysDeny,
            remember: false,
        }));
        let broker = ConfirmationBroker::new(Some(approver.clone()));
        let args = json!({"command": "dangerous_command"});

        assert_eq!(broker.resolve("run_shell", &args, "chat"), Resolution::Denied);
        assert_eq!(broker.resolve("run_shell", &args, "chat"), Resolution::Denied);
        assert_eq!(approver.calls(), 1);
    }

    #[test]
    fn test_cache_key_distinguishes_tool_and_arguments() {
        let a = cache_key("run_shell", &json!({"command": "ls"}));
        let b = cache_key("run_shell", &json!({"command": "pwd"}));
        let c = cache_key("read_file", &json!({"command": "ls"}));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_cache_key_is_argument_order_independent() {
        // serde_json sorts object keys, so semantically identical argument
        // maps produce the same key.
        let a: Value = serde_json::from_str(r#"{"command": "ls", "cwd": "/tmp"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"cwd": "/tmp", "command": "ls"}"#).unwrap();
        assert_eq!(cache_key("run_shell", &a), cache_key("run_shell", &b));
    }

    #[test]
    fn test_brokers_do_not_share_cache() {
        let first = ConfirmationBroker::new(Some(Arc::new(CountingApprover::new(
            ApprovalResponse::allow(true),
        ))));
        let args = json!({"command": "dangerous_command"});
        first.resolve("run_shell", &args, "chat");

        // A fresh broker must prompt again.
        let approver = Arc::new(CountingApprover::new(ApprovalResponse::allow(true)));
        let second = ConfirmationBroker::new(Some(approver.clone()));
        second.resolve("run_shell", &args, "chat");
        assert_eq!(approver.calls(), 1);
    }

    #[test]
    fn test_decision_wire_format() {
        assert_eq!(
            serde_json::to_string(&ApprovalDecision::AlwaysDeny).unwrap(),
            "\"always_deny\""
        );
        let parsed: ApprovalDecision = serde_json::from_str("\"allow\"").unwrap();
        assert_eq!(parsed, ApprovalDecision::Allow);
    }
}
