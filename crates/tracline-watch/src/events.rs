//! Raw adapter events and path filtering.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracline_core::file_extension;

use crate::error::Result;

/// An un-debounced change reported by a [`WatchAdapter`](crate::WatchAdapter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// A file appeared (created or moved in).
    Created(PathBuf),
    /// File contents or metadata changed.
    Modified(PathBuf),
    /// A file disappeared (deleted or moved out).
    Removed(PathBuf),
    /// The backend reported both ends of a rename.
    Renamed {
        /// Original path before the move.
        from: PathBuf,
        /// New path after the move.
        to: PathBuf,
    },
}

impl RawEvent {
    /// The path this event lands on.
    pub fn path(&self) -> &Path {
        match self {
            RawEvent::Created(p) | RawEvent::Modified(p) | RawEvent::Removed(p) => p,
            RawEvent::Renamed { to, .. } => to,
        }
    }
}

/// Extension allow-list plus excluded directory names.
///
/// Exclusions match a directory name at any depth below the root, so
/// `node_modules` skips both `/proj/node_modules` and `/proj/web/node_modules`.
#[derive(Debug, Clone)]
pub struct EventFilter {
    extensions: Vec<String>,
    excluded_names: Vec<String>,
    excluded: GlobSet,
}

impl EventFilter {
    /// `extensions` must already be normalised (`.py`); empty accepts every file.
    pub fn new(extensions: Vec<String>, excluded_dirs: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for name in excluded_dirs {
            let escaped = globset::escape(name);
            builder.add(Glob::new(&format!("**/{}", escaped))?);
            builder.add(Glob::new(&format!("**/{}/**", escaped))?);
        }
        Ok(Self {
            extensions,
            excluded_names: excluded_dirs.to_vec(),
            excluded: builder.build()?,
        })
    }

    /// Filter that accepts everything.
    pub fn allow_all() -> Self {
        Self {
            extensions: Vec::new(),
            excluded_names: Vec::new(),
            excluded: GlobSet::empty(),
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn excluded_dirs(&self) -> &[String] {
        &self.excluded_names
    }

    /// True if `path` lies in (or is) an excluded directory under `root`.
    pub fn is_excluded(&self, root: &Path, path: &Path) -> bool {
        match path.strip_prefix(root) {
            Ok(rel) if rel.as_os_str().is_empty() => false,
            Ok(rel) => self.excluded.is_match(rel),
            Err(_) => true,
        }
    }

    /// True if the extension allow-list accepts `path`.
    pub fn accepts_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        match file_extension(path) {
            Some(ext) => self.extensions.iter().any(|e| *e == ext),
            None => false,
        }
    }

    /// Full check for a file event path.
    pub fn accepts_file(&self, root: &Path, path: &Path) -> bool {
        !self.is_excluded(root, path) && self.accepts_extension(path)
    }
}
