//! In-process [`ContentEngine`] backed by memory.
//!
//! Packages are registered together with the descriptor bytes that name
//! them; the fingerprint is the SHA-256 of those bytes. Piece availability
//! is simulated per source according to a [`FetchMode`], and tests drive it
//! explicitly with [`MemoryEngine::complete_pieces`].

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use super::{ContentEngine, ContentId, PackageFile, PackageMetadata, SourceHandle};
use crate::{EngineError, Priority};

/// How pieces become available in a [`MemoryEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Pieces arrive only through [`MemoryEngine::complete_pieces`].
    #[default]
    Manual,
    /// A piece arrives as soon as a deadline is set for it.
    OnDeadline,
    /// Every piece is available from the moment the source opens.
    Seeded,
}

#[derive(Debug, Clone)]
enum FileContent {
    Bytes(Vec<u8>),
    /// Deterministic filler derived from the absolute package offset.
    Pattern(u64),
}

impl FileContent {
    fn len(&self) -> u64 {
        match self {
            FileContent::Bytes(bytes) => bytes.len() as u64,
            FileContent::Pattern(size) => *size,
        }
    }
}

/// Byte of the filler pattern at absolute package offset `offset`.
pub(crate) fn pattern_byte(offset: u64) -> u8 {
    (offset % 251) as u8
}

/// A package served by a [`MemoryEngine`].
///
/// # Example
///
/// ```rust
/// use torrentfs::MemoryPackage;
///
/// let package = MemoryPackage::new("Release", 16 * 1024)
///     .with_file("Release/readme.txt", b"hello".to_vec())
///     .with_sparse_file("Release/movie.mkv", 1_000_000);
/// assert_eq!(package.total_size(), 1_000_005);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryPackage {
    name: String,
    piece_length: u64,
    files: Vec<(String, FileContent)>,
}

impl MemoryPackage {
    /// Create an empty package. `piece_length` must be non-zero.
    pub fn new(name: impl Into<String>, piece_length: u64) -> Self {
        Self {
            name: name.into(),
            piece_length: piece_length.max(1),
            files: Vec::new(),
        }
    }

    /// Append a file with explicit contents.
    pub fn with_file(mut self, path: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.files.push((path.into(), FileContent::Bytes(bytes)));
        self
    }

    /// Append a file of `size` bytes filled with a deterministic pattern.
    pub fn with_sparse_file(mut self, path: impl Into<String>, size: u64) -> Self {
        self.files.push((path.into(), FileContent::Pattern(size)));
        self
    }

    /// Total number of bytes in the package.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|(_, c)| c.len()).sum()
    }

    fn piece_count(&self) -> u32 {
        self.total_size().div_ceil(self.piece_length) as u32
    }

    fn metadata(&self) -> PackageMetadata {
        let mut offset = 0;
        let files = self
            .files
            .iter()
            .map(|(path, content)| {
                let file = PackageFile {
                    path: path.clone(),
                    size: content.len(),
                    offset,
                };
                offset += content.len();
                file
            })
            .collect();

        PackageMetadata {
            name: self.name.clone(),
            piece_length: self.piece_length,
            piece_count: self.piece_count(),
            files,
            storage_root: None,
        }
    }

    fn read(&self, offset: u64, length: usize) -> Vec<u8> {
        let end = (offset + length as u64).min(self.total_size());
        let mut out = Vec::with_capacity(end.saturating_sub(offset) as usize);
        let mut file_start = 0;

        for (_, content) in &self.files {
            let file_end = file_start + content.len();
            let from = offset.max(file_start);
            let to = end.min(file_end);
            if from < to {
                match content {
                    FileContent::Bytes(bytes) => out.extend_from_slice(
                        &bytes[(from - file_start) as usize..(to - file_start) as usize],
                    ),
                    FileContent::Pattern(_) => out.extend((from..to).map(pattern_byte)),
                }
            }
            file_start = file_end;
        }
        out
    }
}

struct SourceState {
    id: ContentId,
    package: Arc<MemoryPackage>,
    have: Vec<bool>,
    piece_priorities: HashMap<u32, Priority>,
    deadlines: HashMap<u32, Duration>,
    file_priorities: Vec<Priority>,
}

impl SourceState {
    fn check_piece(&self, index: u32) -> Result<(), EngineError> {
        let count = self.have.len() as u32;
        if index >= count {
            return Err(EngineError::PieceOutOfRange { index, count });
        }
        Ok(())
    }
}

/// Memory-backed content engine.
///
/// # Example
///
/// ```rust
/// use torrentfs::{ContentEngine, FetchMode, MemoryEngine, MemoryPackage};
///
/// let engine = MemoryEngine::new(FetchMode::Seeded);
/// let id = engine.register(b"descriptor".to_vec(), MemoryPackage::new("pkg", 4));
///
/// let handle = engine.open_source(b"descriptor").unwrap();
/// assert_eq!(engine.fingerprint(b"descriptor").unwrap(), id);
/// engine.close_source(handle).unwrap();
/// ```
pub struct MemoryEngine {
    mode: FetchMode,
    packages: RwLock<HashMap<ContentId, Arc<MemoryPackage>>>,
    sources: RwLock<HashMap<SourceHandle, SourceState>>,
    opens: RwLock<HashMap<ContentId, usize>>,
    next_handle: AtomicU64,
}

impl MemoryEngine {
    /// Create an engine with no packages.
    pub fn new(mode: FetchMode) -> Self {
        Self {
            mode,
            packages: RwLock::new(HashMap::new()),
            sources: RwLock::new(HashMap::new()),
            opens: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Make `package` openable through `descriptor`. Returns its identity.
    pub fn register(&self, descriptor: Vec<u8>, package: MemoryPackage) -> ContentId {
        let id = Self::digest(&descriptor);
        self.packages.write().insert(id.clone(), Arc::new(package));
        id
    }

    fn digest(descriptor: &[u8]) -> ContentId {
        ContentId::new(hex::encode(Sha256::digest(descriptor)))
    }

    /// How many times a source for `id` has been opened.
    pub fn open_count(&self, id: &ContentId) -> usize {
        self.opens.read().get(id).copied().unwrap_or(0)
    }

    /// Number of sources currently open.
    pub fn live_sources(&self) -> usize {
        self.sources.read().len()
    }

    /// The open handle for `id`, if any.
    pub fn live_handle(&self, id: &ContentId) -> Option<SourceHandle> {
        self.sources
            .read()
            .iter()
            .find(|(_, s)| &s.id == id)
            .map(|(h, _)| *h)
    }

    /// Mark pieces of every open source for `id` as downloaded.
    pub fn complete_pieces(&self, id: &ContentId, pieces: RangeInclusive<u32>) {
        let mut sources = self.sources.write();
        for state in sources.values_mut().filter(|s| &s.id == id) {
            for index in pieces.clone() {
                if let Some(slot) = state.have.get_mut(index as usize) {
                    *slot = true;
                }
            }
        }
    }

    /// Deadline last set for a piece of the open source for `id`.
    pub fn piece_deadline(&self, id: &ContentId, index: u32) -> Option<Duration> {
        self.sources
            .read()
            .values()
            .find(|s| &s.id == id)
            .and_then(|s| s.deadlines.get(&index).copied())
    }

    /// Priority of a piece of the open source for `id`.
    pub fn piece_priority(&self, id: &ContentId, index: u32) -> Priority {
        self.sources
            .read()
            .values()
            .find(|s| &s.id == id)
            .and_then(|s| s.piece_priorities.get(&index).copied())
            .unwrap_or_default()
    }

    /// Pieces that have a deadline, in ascending order.
    pub fn scheduled_pieces(&self, id: &ContentId) -> Vec<u32> {
        let mut pieces: Vec<u32> = self
            .sources
            .read()
            .values()
            .filter(|s| &s.id == id)
            .flat_map(|s| s.deadlines.keys().copied())
            .collect();
        pieces.sort_unstable();
        pieces.dedup();
        pieces
    }

    fn with_source<T>(
        &self,
        handle: SourceHandle,
        f: impl FnOnce(&SourceState) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let sources = self.sources.read();
        let state = sources
            .get(&handle)
            .ok_or(EngineError::UnknownSource(handle))?;
        f(state)
    }

    fn with_source_mut<T>(
        &self,
        handle: SourceHandle,
        f: impl FnOnce(&mut SourceState) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut sources = self.sources.write();
        let state = sources
            .get_mut(&handle)
            .ok_or(EngineError::UnknownSource(handle))?;
        f(state)
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new(FetchMode::default())
    }
}

impl ContentEngine for MemoryEngine {
    fn fingerprint(&self, descriptor: &[u8]) -> Result<ContentId, EngineError> {
        if descriptor.is_empty() {
            return Err(EngineError::BadDescriptor {
                reason: "empty descriptor".into(),
            });
        }
        let id = Self::digest(descriptor);
        if !self.packages.read().contains_key(&id) {
            return Err(EngineError::BadDescriptor {
                reason: "unrecognised package".into(),
            });
        }
        Ok(id)
    }

    fn open_source(&self, descriptor: &[u8]) -> Result<SourceHandle, EngineError> {
        let id = self.fingerprint(descriptor)?;
        let package = self
            .packages
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::BadDescriptor {
                reason: "unrecognised package".into(),
            })?;

        let handle = SourceHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let state = SourceState {
            id: id.clone(),
            have: vec![self.mode == FetchMode::Seeded; package.piece_count() as usize],
            file_priorities: vec![Priority::Normal; package.files.len()],
            piece_priorities: HashMap::new(),
            deadlines: HashMap::new(),
            package,
        };

        self.sources.write().insert(handle, state);
        *self.opens.write().entry(id).or_insert(0) += 1;
        Ok(handle)
    }

    fn metadata(&self, handle: SourceHandle) -> Result<PackageMetadata, EngineError> {
        self.with_source(handle, |s| Ok(s.package.metadata()))
    }

    fn have_piece(&self, handle: SourceHandle, index: u32) -> Result<bool, EngineError> {
        self.with_source(handle, |s| {
            s.check_piece(index)?;
            Ok(s.have[index as usize])
        })
    }

    fn set_file_priority(
        &self,
        handle: SourceHandle,
        file_index: usize,
        priority: Priority,
    ) -> Result<(), EngineError> {
        self.with_source_mut(handle, |s| {
            let count = s.file_priorities.len();
            let slot = s.file_priorities.get_mut(file_index).ok_or_else(|| {
                EngineError::Backend(format!("file {file_index} out of range ({count} files)"))
            })?;
            *slot = priority;
            Ok(())
        })
    }

    fn file_priorities(&self, handle: SourceHandle) -> Result<Vec<Priority>, EngineError> {
        self.with_source(handle, |s| Ok(s.file_priorities.clone()))
    }

    fn file_progress(&self, handle: SourceHandle) -> Result<Vec<u64>, EngineError> {
        self.with_source(handle, |s| {
            let meta = s.package.metadata();
            let plen = meta.piece_length;
            Ok(meta
                .files
                .iter()
                .map(|f| {
                    let end = f.offset + f.size;
                    s.have
                        .iter()
                        .enumerate()
                        .filter(|(_, have)| **have)
                        .map(|(i, _)| {
                            let p_start = i as u64 * plen;
                            let p_end = p_start + plen;
                            end.min(p_end).saturating_sub(f.offset.max(p_start))
                        })
                        .sum()
                })
                .collect())
        })
    }

    fn set_piece_priority(
        &self,
        handle: SourceHandle,
        index: u32,
        priority: Priority,
    ) -> Result<(), EngineError> {
        self.with_source_mut(handle, |s| {
            s.check_piece(index)?;
            s.piece_priorities.insert(index, priority);
            Ok(())
        })
    }

    fn set_piece_deadline(
        &self,
        handle: SourceHandle,
        index: u32,
        deadline: Duration,
    ) -> Result<(), EngineError> {
        let mode = self.mode;
        self.with_source_mut(handle, |s| {
            s.check_piece(index)?;
            s.deadlines.insert(index, deadline);
            if mode == FetchMode::OnDeadline {
                s.have[index as usize] = true;
            }
            Ok(())
        })
    }

    fn read_local(
        &self,
        handle: SourceHandle,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>, EngineError> {
        self.with_source(handle, |s| Ok(s.package.read(offset, length)))
    }

    fn close_source(&self, handle: SourceHandle) -> Result<(), EngineError> {
        self.sources.write().remove(&handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package() -> MemoryPackage {
        MemoryPackage::new("pkg", 4)
            .with_file("pkg/a.txt", b"hello".to_vec())
            .with_sparse_file("pkg/b.bin", 6)
    }

    #[test]
    fn metadata_offsets_are_cumulative() {
        let meta = package().metadata();
        assert_eq!(meta.piece_count, 3);
        assert_eq!(meta.files[0].offset, 0);
        assert_eq!(meta.files[1].offset, 5);
        assert_eq!(meta.files[1].size, 6);
    }

    #[test]
    fn read_spans_files() {
        let bytes = package().read(3, 4);
        assert_eq!(bytes, vec![b'l', b'o', pattern_byte(5), pattern_byte(6)]);
    }

    #[test]
    fn read_clamps_at_end() {
        assert_eq!(package().read(9, 10).len(), 2);
        assert!(package().read(11, 10).is_empty());
    }

    #[test]
    fn unknown_descriptor_is_rejected() {
        let engine = MemoryEngine::default();
        let err = engine.open_source(b"nope").unwrap_err();
        assert!(matches!(err, EngineError::BadDescriptor { .. }));
        assert!(engine.fingerprint(b"").is_err());
    }

    #[test]
    fn manual_mode_waits_for_completion() {
        let engine = MemoryEngine::new(FetchMode::Manual);
        let id = engine.register(b"d".to_vec(), package());
        let handle = engine.open_source(b"d").unwrap();

        assert!(!engine.have_piece(handle, 0).unwrap());
        engine.complete_pieces(&id, 0..=1);
        assert!(engine.have_piece(handle, 1).unwrap());
        assert!(!engine.have_piece(handle, 2).unwrap());
        assert!(engine.have_piece(handle, 3).is_err());
    }

    #[test]
    fn on_deadline_mode_fetches_immediately() {
        let engine = MemoryEngine::new(FetchMode::OnDeadline);
        let id = engine.register(b"d".to_vec(), package());
        let handle = engine.open_source(b"d").unwrap();

        engine
            .set_piece_deadline(handle, 2, Duration::from_secs(1))
            .unwrap();
        assert!(engine.have_piece(handle, 2).unwrap());
        assert_eq!(engine.piece_deadline(&id, 2), Some(Duration::from_secs(1)));
        assert_eq!(engine.scheduled_pieces(&id), vec![2]);
    }

    #[test]
    fn file_progress_counts_available_bytes() {
        let engine = MemoryEngine::new(FetchMode::Manual);
        let id = engine.register(b"d".to_vec(), package());
        let handle = engine.open_source(b"d").unwrap();

        engine.complete_pieces(&id, 1..=1);
        // piece 1 covers bytes 4..8: one byte of a.txt, three of b.bin
        assert_eq!(engine.file_progress(handle).unwrap(), vec![1, 3]);
    }

    #[test]
    fn close_is_idempotent_and_counts_opens() {
        let engine = MemoryEngine::new(FetchMode::Seeded);
        let id = engine.register(b"d".to_vec(), package());
        let handle = engine.open_source(b"d").unwrap();
        assert_eq!(engine.open_count(&id), 1);
        assert_eq!(engine.live_handle(&id), Some(handle));

        engine.close_source(handle).unwrap();
        engine.close_source(handle).unwrap();
        assert_eq!(engine.live_sources(), 0);
        assert!(matches!(
            engine.metadata(handle),
            Err(EngineError::UnknownSource(_))
        ));
    }
}
