//! # Namespace Projector
//!
//! A package's file list is flat: full relative paths and no directory
//! entries. The projector synthesizes the directory levels on demand by
//! looking at entry parents, one level at a time, without ever building the
//! whole tree.
//!
//! ```text
//! entries:  /movie.mkv  /extras/trailer.mkv  /extras/stills/1.jpg
//!
//! list "/"        -> movie.mkv (file), extras (dir)
//! list "/extras"  -> trailer.mkv (file), stills (dir)
//! ```

use std::collections::HashSet;

use crate::source::{ContentEntry, ContentSource};
use crate::{DirEntry, FileKind};

/// What a sub-path names inside a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification<'a> {
    /// An entry in the package's file list.
    File(&'a ContentEntry),
    /// A directory synthesized from entry paths (or the package root).
    Directory,
    /// Nothing in the package.
    None,
}

/// Directory key for a sub-path: `/` for the package root.
fn dir_key(sub_path: &str) -> &str {
    let trimmed = sub_path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// Remainder of `dir` strictly below `key`, without the separating `/`.
fn below<'d>(dir: &'d str, key: &str) -> Option<&'d str> {
    if key == "/" {
        return dir.strip_prefix('/').filter(|rest| !rest.is_empty());
    }
    dir.strip_prefix(key)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
}

/// Directory view over one content source.
#[derive(Debug, Clone, Copy)]
pub struct NamespaceProjector<'a> {
    source: &'a ContentSource,
}

impl<'a> NamespaceProjector<'a> {
    /// Project `source`.
    pub fn new(source: &'a ContentSource) -> Self {
        Self { source }
    }

    /// Classify `sub_path` (empty or `/` for the package root).
    pub fn classify(&self, sub_path: &str) -> Classification<'a> {
        let key = dir_key(sub_path);
        if key == "/" {
            return Classification::Directory;
        }
        if let Some(entry) = self.source.find(key) {
            return Classification::File(entry);
        }
        let is_dir = self
            .source
            .entries()
            .iter()
            .any(|e| e.parent() == key || below(e.parent(), key).is_some());
        if is_dir {
            Classification::Directory
        } else {
            Classification::None
        }
    }

    /// Immediate children of `sub_path`, in internal index order.
    ///
    /// Files whose parent is `sub_path` are listed by name; deeper entries
    /// contribute the first path segment below `sub_path` as a directory.
    /// Names are listed once.
    pub fn list_children(&self, sub_path: &str) -> Vec<DirEntry> {
        let key = dir_key(sub_path);
        let mut seen = HashSet::new();
        let mut children = Vec::new();

        for entry in self.source.entries() {
            let parent = entry.parent();
            let child = if parent == key {
                DirEntry::new(entry.name(), FileKind::File)
            } else if let Some(rest) = below(parent, key) {
                let name = rest.split('/').next().unwrap_or(rest);
                DirEntry::new(name, FileKind::Directory)
            } else {
                continue;
            };
            if seen.insert(child.name.clone()) {
                children.push(child);
            }
        }
        children
    }
}
