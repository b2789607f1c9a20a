//! # Path Resolver
//!
//! Maps a virtual absolute path onto the backing tree.
//!
//! ## Algorithm
//!
//! The path is walked component by component from the root. After each
//! component `c` the resolver checks whether `c<suffix>` exists as a real
//! file next to it, and whether `c` itself is a descriptor file. The first
//! (shallowest) hit binds: everything below it is looked up inside that
//! package, and descriptors nested inside a package are never resolved.
//!
//! ```text
//! /movie                 -> Descriptor  (movie.torrent presented as a directory)
//! /movie.torrent         -> Descriptor  (same package, addressed by file name)
//! /movie/extras/a.mkv    -> Content     (sub_path = "/extras/a.mkv")
//! /docs/readme.txt       -> RealFile
//! ```

use std::path::{Component, Path, PathBuf};

use tracing::trace;

use crate::FsError;

/// What a virtual path refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A real file, symlink or other non-directory in the backing tree.
    RealFile {
        /// Real path.
        path: PathBuf,
    },

    /// A real directory with no descriptor on its path.
    RealDirectory {
        /// Real path.
        path: PathBuf,
    },

    /// The root of a package: the descriptor file presented as a directory.
    Descriptor {
        /// The descriptor file.
        descriptor: PathBuf,
        /// Real path standing in for the package (descriptor minus suffix).
        content_root: PathBuf,
    },

    /// Something below a package root: an entry, a synthesized directory,
    /// or a real path under a coexisting real directory.
    Content {
        /// The descriptor file.
        descriptor: PathBuf,
        /// Real path standing in for the package (descriptor minus suffix).
        content_root: PathBuf,
        /// Path below the content root, with one leading `/` and no
        /// trailing `/`.
        sub_path: String,
    },
}

impl Resolution {
    /// The binding descriptor, if any.
    pub fn descriptor(&self) -> Option<&Path> {
        match self {
            Resolution::Descriptor { descriptor, .. } | Resolution::Content { descriptor, .. } => {
                Some(descriptor)
            }
            _ => None,
        }
    }

    /// Path below the content root; empty for the package root itself.
    pub fn sub_path(&self) -> &str {
        match self {
            Resolution::Content { sub_path, .. } => sub_path,
            _ => "",
        }
    }

    /// The real path this resolution overlays.
    ///
    /// For package paths this is where a coexisting real entry would live
    /// (`<content_root><sub_path>`); it may not exist.
    pub fn real_path(&self) -> PathBuf {
        match self {
            Resolution::RealFile { path } | Resolution::RealDirectory { path } => path.clone(),
            Resolution::Descriptor { content_root, .. } => content_root.clone(),
            Resolution::Content {
                content_root,
                sub_path,
                ..
            } => content_root.join(sub_path.trim_start_matches('/')),
        }
    }
}

/// Resolves virtual paths against a backing root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    suffix: String,
}

impl PathResolver {
    /// Create a resolver for the tree under `root`.
    pub fn new(root: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            suffix: suffix.into(),
        }
    }

    /// Backing root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Descriptor suffix.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Strip the descriptor suffix from a directory entry name.
    ///
    /// Returns `None` when `name` does not carry the suffix.
    pub fn logical_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        name.strip_suffix(self.suffix.as_str())
            .filter(|stem| !stem.is_empty())
    }

    /// Split a virtual path into normal components.
    ///
    /// `.` is dropped and `..` pops lexically without escaping the root.
    pub fn components(virtual_path: &Path) -> Vec<String> {
        let mut parts: Vec<String> = Vec::new();
        for component in virtual_path.components() {
            match component {
                Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
                Component::ParentDir => {
                    parts.pop();
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        parts
    }

    /// Resolve `virtual_path`.
    ///
    /// Resolution only reads the backing tree; resolving the same path twice
    /// without changes to the tree yields equal values.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if no descriptor binds and the real path does
    ///   not exist
    pub fn resolve(&self, virtual_path: &Path) -> Result<Resolution, FsError> {
        let parts = Self::components(virtual_path);
        let mut real = self.root.clone();

        for (depth, name) in parts.iter().enumerate() {
            let rest = &parts[depth + 1..];

            let sibling = real.join(format!("{name}{}", self.suffix));
            if sibling.is_file() {
                let content_root = real.join(name);
                return Ok(self.bind(virtual_path, sibling, content_root, rest));
            }

            real.push(name);

            if let Some(stem) = self.logical_name(name) {
                if real.is_file() {
                    let content_root = real.with_file_name(stem);
                    return Ok(self.bind(virtual_path, real, content_root, rest));
                }
            }
        }

        // Symlinks are not followed, matching the lstat attributes; the root
        // itself may be one.
        let meta = if parts.is_empty() {
            std::fs::metadata(&real)
        } else {
            std::fs::symlink_metadata(&real)
        }
        .map_err(|e| FsError::io("resolve", virtual_path, e))?;
        let resolution = if meta.is_dir() {
            Resolution::RealDirectory { path: real }
        } else {
            Resolution::RealFile { path: real }
        };
        trace!(path = %virtual_path.display(), ?resolution, "resolved to real path");
        Ok(resolution)
    }

    fn bind(
        &self,
        virtual_path: &Path,
        descriptor: PathBuf,
        content_root: PathBuf,
        rest: &[String],
    ) -> Resolution {
        let resolution = if rest.is_empty() {
            Resolution::Descriptor {
                descriptor,
                content_root,
            }
        } else {
            Resolution::Content {
                descriptor,
                content_root,
                sub_path: format!("/{}", rest.join("/")),
            }
        };
        trace!(path = %virtual_path.display(), ?resolution, "resolved inside package");
        resolution
    }
}
