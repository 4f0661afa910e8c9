//! Glyphx: safety-gated tool execution for LLM assistants
//!
//! Glyphx lets a chat model run shell commands, saved command shortcuts
//! ("glyphs"), and file operations on the host, with every invocation
//! passing through a static safety policy, an optional human confirmation
//! step, and deterministic output bounding before anything reaches the
//! model transcript.

pub mod agent;
mod paths;
pub mod registry;
pub mod safety;
pub mod tools;

pub use paths::resolve_path;
pub use registry::{Glyph, GlyphCreate, GlyphRegistry, RegistryError, default_registry_path};
pub use safety::{SafetyConfig, SafetyValidator, Verdict};
pub use tools::{ToolReply, ToolsBridge};
