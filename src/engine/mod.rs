//! # Content Engine Boundary
//!
//! The download engine (peer discovery, wire protocol, piece storage) lives
//! outside this crate. [`ContentEngine`] is the narrow surface the
//! projection needs from it: package metadata, piece availability, priority
//! and deadline hints, and reads from local storage.
//!
//! [`MemoryEngine`] is an in-process implementation backed by synthetic or
//! caller-provided bytes, used by the tests and useful for embedding.

mod memory;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::{EngineError, Priority};

pub use memory::{FetchMode, MemoryEngine, MemoryPackage};

/// Package fingerprint (content hash) used as the identity of a source.
///
/// Two descriptor files that describe the same package share a `ContentId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContentId(String);

impl ContentId {
    /// Wrap a fingerprint string (typically a hex digest).
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self(fingerprint.into())
    }

    /// The fingerprint string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Engine-side handle to an opened package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceHandle(pub u64);

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One file in a package's flat internal file list.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PackageFile {
    /// Relative path as stored in the package, usually prefixed with the
    /// package's internal name (`Release/movie.mkv`).
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Byte offset of the file within the package's piece-addressed space.
    pub offset: u64,
}

/// Metadata of an opened package.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PackageMetadata {
    /// Internal name of the package.
    pub name: String,
    /// Size of every piece except possibly the last.
    pub piece_length: u64,
    /// Number of pieces.
    pub piece_count: u32,
    /// Files in internal index order.
    pub files: Vec<PackageFile>,
    /// Where the engine keeps downloaded data, if on disk.
    pub storage_root: Option<PathBuf>,
}

impl PackageMetadata {
    /// Total number of bytes in the package.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.offset + f.size).max().unwrap_or(0)
    }
}

/// Operations the projection consumes from the download engine.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. Methods take `&self` and may be
/// called concurrently for the same handle: several reads can update
/// priorities and deadlines of one source at the same time.
///
/// # Lifetime
///
/// The projection reference-counts sources itself and calls
/// [`close_source`](Self::close_source) once per handle, after its last
/// holder released it. Closing must remove any transient local storage the
/// engine created for that source.
///
/// # Object Safety
///
/// This trait is object-safe and is held as `Arc<dyn ContentEngine>`.
pub trait ContentEngine: Send + Sync {
    /// Compute the package identity from descriptor bytes without opening it.
    ///
    /// # Errors
    ///
    /// - [`EngineError::BadDescriptor`] if the bytes are not a package
    fn fingerprint(&self, descriptor: &[u8]) -> Result<ContentId, EngineError>;

    /// Start a source for the package described by `descriptor`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::BadDescriptor`] if the bytes are not a package
    fn open_source(&self, descriptor: &[u8]) -> Result<SourceHandle, EngineError>;

    /// Metadata of an open source.
    fn metadata(&self, handle: SourceHandle) -> Result<PackageMetadata, EngineError>;

    /// Whether piece `index` is available in local storage.
    fn have_piece(&self, handle: SourceHandle, index: u32) -> Result<bool, EngineError>;

    /// Set the fetch priority of file `file_index`.
    fn set_file_priority(
        &self,
        handle: SourceHandle,
        file_index: usize,
        priority: Priority,
    ) -> Result<(), EngineError>;

    /// Current priority of every file, in internal index order.
    fn file_priorities(&self, handle: SourceHandle) -> Result<Vec<Priority>, EngineError>;

    /// Bytes downloaded per file, in internal index order.
    fn file_progress(&self, handle: SourceHandle) -> Result<Vec<u64>, EngineError>;

    /// Set the fetch priority of a single piece.
    fn set_piece_priority(
        &self,
        handle: SourceHandle,
        index: u32,
        priority: Priority,
    ) -> Result<(), EngineError>;

    /// Ask the engine to have piece `index` within `deadline` from now.
    fn set_piece_deadline(
        &self,
        handle: SourceHandle,
        index: u32,
        deadline: Duration,
    ) -> Result<(), EngineError>;

    /// Read `length` bytes at absolute package offset `offset` from local
    /// storage. Callers only read ranges whose pieces are available.
    fn read_local(
        &self,
        handle: SourceHandle,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>, EngineError>;

    /// Stop the source and remove its transient storage. Idempotent.
    fn close_source(&self, handle: SourceHandle) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_engine_is_object_safe() {
        fn _check(_: &dyn ContentEngine) {}
    }

    #[test]
    fn content_engine_requires_send_sync() {
        fn _assert_send_sync<T: Send + Sync>() {}
        fn _check<T: ContentEngine>() {
            _assert_send_sync::<T>();
        }
    }

    #[test]
    fn total_size_spans_last_file() {
        let meta = PackageMetadata {
            name: "pkg".into(),
            piece_length: 4,
            piece_count: 3,
            files: vec![
                PackageFile {
                    path: "pkg/a".into(),
                    size: 5,
                    offset: 0,
                },
                PackageFile {
                    path: "pkg/b".into(),
                    size: 6,
                    offset: 5,
                },
            ],
            storage_root: None,
        };
        assert_eq!(meta.total_size(), 11);
    }

    #[test]
    fn content_id_display() {
        let id = ContentId::new("abc123");
        assert_eq!(id.to_string(), "abc123");
        assert_eq!(id.as_str(), "abc123");
        assert_eq!(SourceHandle(4).to_string(), "#4");
    }
}
