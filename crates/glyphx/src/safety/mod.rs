//! Safety controls for tool execution.
//!
//! Three cooperating layers gate every privileged operation:
//!
//! - **Validation** ([`SafetyValidator`]): pure rule evaluation of a shell
//!   command or file path against the static [`SafetyConfig`]. Deny
//!   patterns always run before allow rules and win.
//! - **Confirmation** ([`ConfirmationBroker`]): when a rejection is soft
//!   (`require_confirmation` and an interactive mode), the request is
//!   escalated to a host-registered [`ConfirmationApprover`], with
//!   per-session caching of remembered decisions.
//! - **Bounding** ([`truncate_output`], [`truncate_tool_payload`]): any
//!   text returned from a tool is capped deterministically with a visible
//!   marker.
//!
//! The validator decides what is *intrinsically* acceptable; the broker
//! decides what the human tolerates today; neither sandboxes anything.
//! Once approved, a shell command runs with the process's full privileges,
//! and the file jail is advisory path containment, not a namespace.

mod config;
mod confirm;
mod truncate;
mod validator;

pub use config::SafetyConfig;
pub use confirm::{
    AllowAllApprover, ApprovalDecision, ApprovalResponse, ConfirmationApprover,
    ConfirmationBroker, DenyAllApprover, Resolution,
};
pub use truncate::{truncate_output, truncate_tool_payload};
pub use validator::{PatternError, SafetyValidator, Verdict};
