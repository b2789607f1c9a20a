//! Live content sources and the entries inside them.
//!
//! A [`ContentSource`] wraps one engine handle together with the package's
//! metadata, parsed once when the source opens. It owns its
//! [`ContentEntry`] list; an entry refers back to its source only through
//! the index it was assigned at construction, which is also the key the
//! engine uses for per-file priority and progress.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::engine::{ContentEngine, ContentId, PackageMetadata, SourceHandle};
use crate::{FsError, Priority};

/// Re-anchor a package-internal path below the content root.
///
/// Internal paths usually start with the package's own name
/// (`Release/sub/movie.mkv`); that leading component is dropped so the
/// result is relative to the content root (`/sub/movie.mkv`). A path that
/// consists of the name alone (single-file packages) is kept as is.
///
/// ```rust
/// use torrentfs::normalize_internal_path;
///
/// assert_eq!(normalize_internal_path("Release", "Release/movie.mkv"), "/movie.mkv");
/// assert_eq!(normalize_internal_path("movie.mkv", "movie.mkv"), "/movie.mkv");
/// assert_eq!(normalize_internal_path("Release", "Other/a.txt"), "/Other/a.txt");
/// ```
pub fn normalize_internal_path(package_name: &str, internal: &str) -> String {
    let parts: Vec<&str> = internal.split('/').filter(|p| !p.is_empty()).collect();
    let rest = match parts.split_first() {
        Some((first, rest)) if *first == package_name && !rest.is_empty() => rest,
        _ => &parts[..],
    };
    format!("/{}", rest.join("/"))
}

/// One logical file inside a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    index: usize,
    path: String,
    size: u64,
    offset: u64,
}

impl ContentEntry {
    /// Position in the package's internal file list.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Path below the content root, always starting with `/`.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Byte offset within the package's piece-addressed space.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Final path component.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Directory containing the entry (`/` for top-level files).
    pub fn parent(&self) -> &str {
        match self.path.rfind('/') {
            Some(0) | None => "/",
            Some(i) => &self.path[..i],
        }
    }
}

/// What the scheduler has asked the engine for on a still-missing piece.
#[derive(Debug, Clone, Copy)]
struct PieceRequest {
    priority: Priority,
    deadline: Duration,
}

/// A live, shared handle into the content engine for one package.
pub struct ContentSource {
    id: ContentId,
    handle: SourceHandle,
    descriptor: PathBuf,
    name: String,
    piece_length: u64,
    piece_count: u32,
    storage_root: Option<PathBuf>,
    entries: Vec<ContentEntry>,
    engine: Arc<dyn ContentEngine>,
    requests: Mutex<HashMap<u32, PieceRequest>>,
}

impl std::fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentSource")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("descriptor", &self.descriptor)
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl ContentSource {
    /// Build a source from an already opened engine handle.
    pub(crate) fn new(
        engine: Arc<dyn ContentEngine>,
        id: ContentId,
        handle: SourceHandle,
        descriptor: &Path,
    ) -> Result<Self, FsError> {
        let meta = engine
            .metadata(handle)
            .map_err(|e| FsError::engine(descriptor, e))?;
        Self::from_metadata(engine, id, handle, descriptor, meta)
    }

    fn from_metadata(
        engine: Arc<dyn ContentEngine>,
        id: ContentId,
        handle: SourceHandle,
        descriptor: &Path,
        meta: PackageMetadata,
    ) -> Result<Self, FsError> {
        let piece_length = meta.piece_length.max(1);
        let covered = piece_length.saturating_mul(u64::from(meta.piece_count));
        if covered < meta.total_size() {
            return Err(FsError::BadDescriptor {
                path: descriptor.to_path_buf(),
                reason: format!(
                    "{} pieces of {piece_length} bytes cannot hold {} bytes",
                    meta.piece_count,
                    meta.total_size()
                ),
            });
        }

        let entries = meta
            .files
            .iter()
            .enumerate()
            .map(|(index, file)| ContentEntry {
                index,
                path: normalize_internal_path(&meta.name, &file.path),
                size: file.size,
                offset: file.offset,
            })
            .collect();

        debug!(%id, name = %meta.name, files = meta.files.len(), "loaded package metadata");

        Ok(Self {
            id,
            handle,
            descriptor: descriptor.to_path_buf(),
            name: meta.name,
            piece_length,
            piece_count: meta.piece_count,
            storage_root: meta.storage_root,
            entries,
            engine,
            requests: Mutex::new(HashMap::new()),
        })
    }

    /// Package identity.
    pub fn id(&self) -> &ContentId {
        &self.id
    }

    /// Engine handle.
    pub fn handle(&self) -> SourceHandle {
        self.handle
    }

    /// Descriptor file this source was opened from.
    pub fn descriptor(&self) -> &Path {
        &self.descriptor
    }

    /// Internal package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Piece size in bytes.
    pub fn piece_length(&self) -> u64 {
        self.piece_length
    }

    /// Number of pieces.
    pub fn piece_count(&self) -> u32 {
        self.piece_count
    }

    /// Local storage root reported by the engine.
    pub fn storage_root(&self) -> Option<&Path> {
        self.storage_root.as_deref()
    }

    /// All entries in internal index order.
    pub fn entries(&self) -> &[ContentEntry] {
        &self.entries
    }

    /// Entry at internal index `index`.
    pub fn entry(&self, index: usize) -> Option<&ContentEntry> {
        self.entries.get(index)
    }

    /// Entry whose normalized path equals `sub_path`.
    pub fn find(&self, sub_path: &str) -> Option<&ContentEntry> {
        self.entries.iter().find(|e| e.path == sub_path)
    }

    fn engine_err(&self, e: crate::EngineError) -> FsError {
        FsError::engine(&self.descriptor, e)
    }

    /// Whether piece `index` is available locally.
    pub fn have_piece(&self, index: u32) -> Result<bool, FsError> {
        self.engine
            .have_piece(self.handle, index)
            .map_err(|e| self.engine_err(e))
    }

    /// Whether every piece in `pieces` is available locally.
    pub fn have_pieces(&self, pieces: RangeInclusive<u32>) -> Result<bool, FsError> {
        for index in pieces {
            if !self.have_piece(index)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Ask for a piece with at least `priority` and at most `deadline`.
    ///
    /// Requests from concurrent readers are merged: a piece's priority is only
    /// raised and its deadline only tightened until it has been delivered and
    /// [`settle`](Self::settle)d.
    pub fn request_piece(
        &self,
        index: u32,
        priority: Priority,
        deadline: Duration,
    ) -> Result<(), FsError> {
        let mut requests = self.requests.lock();
        let merged = match requests.get(&index) {
            Some(prev) if prev.priority >= priority && prev.deadline <= deadline => return Ok(()),
            Some(prev) => PieceRequest {
                priority: prev.priority.max(priority),
                deadline: prev.deadline.min(deadline),
            },
            None => PieceRequest { priority, deadline },
        };

        self.engine
            .set_piece_priority(self.handle, index, merged.priority)
            .map_err(|e| self.engine_err(e))?;
        self.engine
            .set_piece_deadline(self.handle, index, merged.deadline)
            .map_err(|e| self.engine_err(e))?;
        requests.insert(index, merged);
        Ok(())
    }

    /// Forget outstanding requests for delivered pieces.
    pub fn settle(&self, pieces: RangeInclusive<u32>) {
        let mut requests = self.requests.lock();
        for index in pieces {
            requests.remove(&index);
        }
    }

    /// Read from local storage at an absolute package offset.
    pub fn read_local(&self, offset: u64, length: usize) -> Result<Vec<u8>, FsError> {
        self.engine
            .read_local(self.handle, offset, length)
            .map_err(|e| self.engine_err(e))
    }

    /// Current fetch priority of `entry`.
    pub fn priority(&self, entry: &ContentEntry) -> Result<Priority, FsError> {
        let priorities = self
            .engine
            .file_priorities(self.handle)
            .map_err(|e| self.engine_err(e))?;
        Ok(priorities.get(entry.index).copied().unwrap_or_default())
    }

    /// Set the fetch priority of `entry`.
    pub fn set_priority(&self, entry: &ContentEntry, priority: Priority) -> Result<(), FsError> {
        self.engine
            .set_file_priority(self.handle, entry.index, priority)
            .map_err(|e| self.engine_err(e))
    }

    /// Fetch only `entry`: raise it to `High` and skip every other file.
    pub fn download_only(&self, entry: &ContentEntry) -> Result<(), FsError> {
        for other in &self.entries {
            let priority = if other.index == entry.index {
                Priority::High
            } else {
                Priority::Skip
            };
            self.set_priority(other, priority)?;
        }
        Ok(())
    }

    /// Bytes of `entry` available locally.
    pub fn progress(&self, entry: &ContentEntry) -> Result<u64, FsError> {
        let progress = self
            .engine
            .file_progress(self.handle)
            .map_err(|e| self.engine_err(e))?;
        Ok(progress.get(entry.index).copied().unwrap_or(0))
    }

    /// Completion of `entry` in percent.
    pub fn completed_percent(&self, entry: &ContentEntry) -> Result<f64, FsError> {
        if entry.size == 0 {
            return Ok(100.0);
        }
        Ok(self.progress(entry)? as f64 / entry.size as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FetchMode, MemoryEngine, MemoryPackage};

    fn open(engine: &Arc<MemoryEngine>) -> ContentSource {
        engine.register(
            b"desc".to_vec(),
            MemoryPackage::new("Release", 4)
                .with_file("Release/movie.mkv", vec![0; 10])
                .with_file("Release/extras/trailer.mkv", vec![1; 6]),
        );
        let handle = engine.open_source(b"desc").unwrap();
        let id = engine.fingerprint(b"desc").unwrap();
        let dyn_engine: Arc<dyn ContentEngine> = engine.clone();
        ContentSource::new(dyn_engine, id, handle, Path::new("/root/movie.torrent")).unwrap()
    }

    #[test]
    fn normalize_strips_package_name() {
        assert_eq!(normalize_internal_path("Release", "Release/a/b.txt"), "/a/b.txt");
        assert_eq!(normalize_internal_path("Release", "/Release/b.txt"), "/b.txt");
        assert_eq!(normalize_internal_path("Release", "ReleaseX/b.txt"), "/ReleaseX/b.txt");
        assert_eq!(normalize_internal_path("solo.bin", "solo.bin"), "/solo.bin");
    }

    #[test]
    fn entry_name_and_parent() {
        let engine = Arc::new(MemoryEngine::new(FetchMode::Seeded));
        let source = open(&engine);

        let movie = source.entry(0).unwrap();
        assert_eq!(movie.path(), "/movie.mkv");
        assert_eq!(movie.name(), "movie.mkv");
        assert_eq!(movie.parent(), "/");

        let trailer = source.find("/extras/trailer.mkv").unwrap();
        assert_eq!(trailer.index(), 1);
        assert_eq!(trailer.parent(), "/extras");
        assert_eq!(trailer.offset(), 10);
        assert_eq!(source.piece_count(), 4);
    }

    #[test]
    fn requests_only_tighten() {
        let engine = Arc::new(MemoryEngine::new(FetchMode::Manual));
        let source = open(&engine);
        let id = source.id().clone();

        source
            .request_piece(1, Priority::High, Duration::from_secs(10))
            .unwrap();
        source
            .request_piece(1, Priority::Normal, Duration::from_secs(13))
            .unwrap();
        assert_eq!(engine.piece_deadline(&id, 1), Some(Duration::from_secs(10)));
        assert_eq!(engine.piece_priority(&id, 1), Priority::High);

        source
            .request_piece(1, Priority::High, Duration::from_secs(5))
            .unwrap();
        assert_eq!(engine.piece_deadline(&id, 1), Some(Duration::from_secs(5)));

        source.settle(1..=1);
        source
            .request_piece(1, Priority::High, Duration::from_secs(12))
            .unwrap();
        assert_eq!(engine.piece_deadline(&id, 1), Some(Duration::from_secs(12)));
    }

    #[test]
    fn download_only_skips_other_files() {
        let engine = Arc::new(MemoryEngine::new(FetchMode::Seeded));
        let source = open(&engine);
        let trailer = source.entry(1).unwrap().clone();

        source.download_only(&trailer).unwrap();
        assert_eq!(source.priority(&trailer).unwrap(), Priority::High);
        assert_eq!(source.priority(source.entry(0).unwrap()).unwrap(), Priority::Skip);
    }

    #[test]
    fn completed_percent_tracks_pieces() {
        let engine = Arc::new(MemoryEngine::new(FetchMode::Manual));
        let source = open(&engine);
        let movie = source.entry(0).unwrap().clone();

        assert_eq!(source.completed_percent(&movie).unwrap(), 0.0);
        engine.complete_pieces(source.id(), 0..=1);
        assert_eq!(source.progress(&movie).unwrap(), 8);
        assert_eq!(source.completed_percent(&movie).unwrap(), 80.0);
    }

    #[test]
    fn pieces_must_cover_every_file() {
        let engine = Arc::new(MemoryEngine::new(FetchMode::Seeded));
        let meta = PackageMetadata {
            name: "Release".into(),
            piece_length: 4,
            piece_count: 2,
            files: vec![crate::engine::PackageFile {
                path: "Release/movie.mkv".into(),
                size: 10,
                offset: 0,
            }],
            storage_root: None,
        };
        let err = ContentSource::from_metadata(
            engine,
            ContentId::new("short"),
            SourceHandle(1),
            Path::new("/root/movie.torrent"),
            meta,
        )
        .unwrap_err();
        assert!(matches!(err, FsError::BadDescriptor { .. }));
        assert_eq!(err.errno(), libc::EIO);
    }
}
