//! Path resolution shared by the validator and the file tools.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Resolve a user-supplied path to a canonical absolute form.
///
/// Expands a leading `~`, makes the path absolute against the current
/// working directory, and follows symlinks via `canonicalize` for the
/// longest existing prefix. Components past the deepest existing ancestor
/// (a file about to be created, say) are normalized lexically so that new
/// paths are still validatable against the jail.
pub fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    let expanded = expand_home(path)?;
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()?.join(expanded)
    };
    let normalized = normalize_lexically(&absolute);

    // Follow symlinks for as much of the path as exists on disk.
    let mut existing = normalized.clone();
    let mut tail = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(canonical) => {
                let mut resolved = canonical;
                for part in tail.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let Some(name) = existing.file_name() else {
                    return Ok(normalized);
                };
                tail.push(name.to_owned());
                if !existing.pop() {
                    return Ok(normalized);
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn expand_home(path: &Path) -> io::Result<PathBuf> {
    let Some(raw) = path.to_str() else {
        return Ok(path.to_path_buf());
    };
    if raw == "~" {
        return home_dir();
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        return Ok(home_dir()?.join(rest));
    }
    Ok(path.to_path_buf())
}

fn home_dir() -> io::Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "home directory not found"))
}

/// Collapse `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
