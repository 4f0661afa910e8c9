//! Persistence for glyph definitions.
//!
//! A glyph is a named, saved shell command with an optional working
//! directory and tags. The registry keeps glyphs in memory behind a lock
//! and, when given a path, mirrors every mutation to a pretty-printed JSON
//! file so a GUI or editor can inspect it.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors from registry persistence.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Reading or writing the backing file failed.
    #[error("registry IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The backing file is not valid JSON at the top level.
    #[error("registry parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// The registry lock was poisoned by a panicking thread.
    #[error("registry lock poisoned")]
    Poisoned,
}

/// A named, saved shell command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Glyph {
    /// Stable 8-hex-char identifier.
    pub id: String,
    /// Display/order position; stable across removals.
    pub index: u32,
    /// Human-readable name, unique-ish but not enforced.
    pub name: String,
    /// The shell command the glyph runs.
    pub cmd: String,
    /// Optional decorative emoji.
    #[serde(default)]
    pub emoji: Option<String>,
    /// Optional working directory for the command.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Fields supplied when creating a glyph; id, index, and timestamp are
/// assigned by the registry.
#[derive(Debug, Clone, Default)]
pub struct GlyphCreate {
    /// Human-readable name.
    pub name: String,
    /// The shell command.
    pub cmd: String,
    /// Optional decorative emoji.
    pub emoji: Option<String>,
    /// Optional working directory.
    pub cwd: Option<PathBuf>,
    /// Free-form tags.
    pub tags: Vec<String>,
}

/// Platform default location for the registry file:
/// `<config dir>/glyphx/registry.json`.
pub fn default_registry_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("glyphx").join("registry.json"))
}

fn generate_id() -> String {
    format!("{:08x}", rand::random::<u32>())
}

fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Glyph store with optional JSON-file persistence.
#[derive(Debug)]
pub struct GlyphRegistry {
    path: Option<PathBuf>,
    glyphs: Mutex<Vec<Glyph>>,
}

impl GlyphRegistry {
    /// An empty registry with no backing file.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            glyphs: Mutex::new(Vec::new()),
        }
    }

    /// Open a registry backed by `path`, creating parent directories.
    ///
    /// A missing file yields an empty registry. Malformed entries in an
    /// existing file are skipped rather than failing the whole load, so
    /// one hand-edited glyph cannot take the registry down.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let glyphs = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let payload: Value = serde_json::from_str(&raw)?;
            payload
                .get("glyphs")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| serde_json::from_value(item.clone()).ok())
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        Ok(Self {
            path: Some(path),
            glyphs: Mutex::new(glyphs),
        })
    }

    /// All glyphs, sorted by index.
    pub fn list(&self) -> Vec<Glyph> {
        let mut glyphs = self
            .glyphs
            .lock()
            .map(|glyphs| glyphs.clone())
            .unwrap_or_default();
        glyphs.sort_by_key(|glyph| glyph.index);
        glyphs
    }

    /// Look up a glyph by id.
    pub fn get(&self, id: &str) -> Option<Glyph> {
        self.glyphs
            .lock()
            .ok()
            .and_then(|glyphs| glyphs.iter().find(|glyph| glyph.id == id).cloned())
    }

    /// Look up a glyph by id, falling back to a case-insensitive name
    /// match.
    pub fn find(&self, identifier: &str) -> Option<Glyph> {
        let glyphs = self.glyphs.lock().ok()?;
        glyphs
            .iter()
            .find(|glyph| glyph.id == identifier)
            .or_else(|| {
                glyphs
                    .iter()
                    .find(|glyph| glyph.name.eq_ignore_ascii_case(identifier))
            })
            .cloned()
    }

    /// Create a glyph and persist the registry.
    pub fn add(&self, payload: GlyphCreate) -> Result<Glyph, RegistryError> {
        let glyph = {
            let mut glyphs = self.glyphs.lock().map_err(|_| RegistryError::Poisoned)?;
            let next_index = glyphs
                .iter()
                .map(|glyph| glyph.index + 1)
                .max()
                .unwrap_or(0);
            let glyph = Glyph {
                id: generate_id(),
                index: next_index,
                name: payload.name,
                cmd: payload.cmd,
                emoji: payload.emoji,
                cwd: payload.cwd,
                tags: payload.tags,
                created_at: utc_now_iso(),
            };
            glyphs.push(glyph.clone());
            glyph
        };
        self.save()?;
        Ok(glyph)
    }

    /// Remove a glyph by id. Returns whether anything was removed.
    pub fn remove(&self, id: &str) -> Result<bool, RegistryError> {
        let removed = {
            let mut glyphs = self.glyphs.lock().map_err(|_| RegistryError::Poisoned)?;
            let before = glyphs.len();
            glyphs.retain(|glyph| glyph.id != id);
            glyphs.len() != before
        };
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    /// Number of glyphs.
    pub fn len(&self) -> usize {
        self.glyphs.lock().map(|glyphs| glyphs.len()).unwrap_or(0)
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn save(&self) -> Result<(), RegistryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let glyphs = self.list();
        let payload = serde_json::json!({ "glyphs": glyphs });
        std::fs::write(path, serde_json::to_string_pretty(&payload)?)?;
        Ok(())
    }

    /// The backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
