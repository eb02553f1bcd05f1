//! Path canonicalisation for association keys.
//!
//! Associations are keyed by absolute paths with symlinks resolved, the form
//! the watcher reports for a canonical project root. Files may not exist (a
//! deleted file keeps its inactive rows), so only the existing prefix of a
//! path is resolved against the file system.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Make `path` absolute against `base` and resolve `.` and `..` lexically.
pub fn normalize_path(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Never pop past the root
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// [`normalize_path`], then resolve symlinks in the longest prefix that
/// exists. The missing remainder is appended as given.
pub fn resolve_path(path: &Path, base: &Path) -> PathBuf {
    let lexical = normalize_path(path, base);
    let mut existing = lexical.as_path();
    let mut missing: Vec<&OsStr> = Vec::new();

    let resolved = loop {
        if let Ok(real) = std::fs::canonicalize(existing) {
            break Some(real);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => break None,
        }
    };

    match resolved {
        Some(mut real) => {
            for name in missing.iter().rev() {
                real.push(name);
            }
            real
        }
        None => lexical.clone(),
    }
}

/// Lower-cased extension with a leading dot, e.g. `.py`.
pub fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}
