//! Reference-counted registry of live content sources.
//!
//! At most one [`ContentSource`] exists per package identity. Callers
//! [`acquire`](SourceRegistry::acquire) a source for the duration of one
//! logical operation and get a [`SourceGuard`]; dropping the guard releases
//! the hold on every exit path. A source is torn down only once its last
//! guard is gone, and then only if the registry was built with
//! `remove_after_use` (otherwise it stays idle until
//! [`shutdown`](SourceRegistry::shutdown)).

use std::collections::HashMap;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::engine::{ContentEngine, ContentId};
use crate::source::ContentSource;
use crate::FsError;

struct Slot {
    source: Arc<ContentSource>,
    holders: usize,
}

/// Deduplicating, reference-counting owner of content sources.
pub struct SourceRegistry {
    engine: Arc<dyn ContentEngine>,
    remove_after_use: bool,
    slots: Mutex<HashMap<ContentId, Slot>>,
    /// One gate per package being opened; only acquisitions of that package
    /// wait on it.
    opening: Mutex<HashMap<ContentId, Arc<Mutex<()>>>>,
}

impl SourceRegistry {
    /// Create an empty registry over `engine`.
    pub fn new(engine: Arc<dyn ContentEngine>, remove_after_use: bool) -> Arc<Self> {
        Arc::new(Self {
            engine,
            remove_after_use,
            slots: Mutex::new(HashMap::new()),
            opening: Mutex::new(HashMap::new()),
        })
    }

    /// Acquire the source described by the descriptor file at `descriptor`.
    ///
    /// Concurrent acquisitions of the same package share one engine handle:
    /// the first opens it while the others wait on a per-package gate. The
    /// registry lock itself is never held across an engine call, so opening
    /// one package does not hold up acquisitions or releases of another.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the descriptor vanished
    /// - [`FsError::BadDescriptor`] if the engine cannot parse it
    pub fn acquire(self: &Arc<Self>, descriptor: &Path) -> Result<SourceGuard, FsError> {
        let bytes = std::fs::read(descriptor)
            .map_err(|e| FsError::io("read descriptor", descriptor, e))?;
        let id = self
            .engine
            .fingerprint(&bytes)
            .map_err(|e| FsError::engine(descriptor, e))?;

        if let Some(guard) = self.reuse(&id) {
            return Ok(guard);
        }

        let gate = self.opening.lock().entry(id.clone()).or_default().clone();
        let _opening = gate.lock();
        if let Some(guard) = self.reuse(&id) {
            return Ok(guard);
        }

        let opened = self.open(&id, &bytes, descriptor).map(|source| self.install(&id, source));
        {
            let mut opening = self.opening.lock();
            if opening.get(&id).is_some_and(|g| Arc::ptr_eq(g, &gate)) {
                opening.remove(&id);
            }
        }
        opened
    }

    /// Register a freshly opened source, or close it if another acquisition
    /// got there first.
    fn install(self: &Arc<Self>, id: &ContentId, source: Arc<ContentSource>) -> SourceGuard {
        let existing = {
            let mut slots = self.slots.lock();
            match slots.get_mut(id) {
                Some(slot) => {
                    slot.holders += 1;
                    slot.source.clone()
                }
                None => {
                    slots.insert(
                        id.clone(),
                        Slot {
                            source: source.clone(),
                            holders: 1,
                        },
                    );
                    return self.guard(source);
                }
            }
        };
        self.close(&source);
        self.guard(existing)
    }

    fn reuse(self: &Arc<Self>, id: &ContentId) -> Option<SourceGuard> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(id)?;
        slot.holders += 1;
        debug!(%id, holders = slot.holders, "reusing content source");
        Some(self.guard(slot.source.clone()))
    }

    fn open(&self, id: &ContentId, bytes: &[u8], descriptor: &Path) -> Result<Arc<ContentSource>, FsError> {
        let handle = self
            .engine
            .open_source(bytes)
            .map_err(|e| FsError::engine(descriptor, e))?;
        match ContentSource::new(self.engine.clone(), id.clone(), handle, descriptor) {
            Ok(source) => {
                debug!(%id, %handle, descriptor = %descriptor.display(), "opened content source");
                Ok(Arc::new(source))
            }
            Err(e) => {
                if let Err(close_err) = self.engine.close_source(handle) {
                    warn!(%id, error = %close_err, "failed to close half-opened source");
                }
                Err(e)
            }
        }
    }

    fn guard(self: &Arc<Self>, source: Arc<ContentSource>) -> SourceGuard {
        SourceGuard {
            registry: self.clone(),
            source,
        }
    }

    /// Drop one hold on `source`. A guard from before a
    /// [`shutdown`](Self::shutdown) no longer matches the slot of a package
    /// opened since, and releases nothing.
    fn release(&self, source: &Arc<ContentSource>) {
        let closing = {
            let mut slots = self.slots.lock();
            let Some(slot) = slots.get_mut(source.id()) else {
                return;
            };
            if !Arc::ptr_eq(&slot.source, source) {
                debug!(id = %source.id(), "stale guard released");
                return;
            }
            slot.holders = slot.holders.saturating_sub(1);
            if slot.holders > 0 || !self.remove_after_use {
                return;
            }
            slots.remove(source.id())
        };
        if let Some(slot) = closing {
            self.close(&slot.source);
        }
    }

    fn close(&self, source: &ContentSource) {
        debug!(id = %source.id(), handle = %source.handle(), "tearing down content source");
        if let Err(e) = self.engine.close_source(source.handle()) {
            warn!(id = %source.id(), error = %e, "failed to close content source");
        }
    }

    /// Number of live guards for `id`.
    pub fn holders(&self, id: &ContentId) -> usize {
        self.slots.lock().get(id).map_or(0, |s| s.holders)
    }

    /// Number of sources currently open (held or idle).
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns `true` if no source is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every source regardless of holders.
    ///
    /// Guards still alive afterwards release nothing, even once the same
    /// package has been acquired again.
    pub fn shutdown(&self) {
        let drained: Vec<Slot> = self.slots.lock().drain().map(|(_, s)| s).collect();
        for slot in drained {
            if slot.holders > 0 {
                warn!(id = %slot.source.id(), holders = slot.holders, "closing source that is still held");
            }
            self.close(&slot.source);
        }
    }
}

/// Scoped hold on a [`ContentSource`]; releases on drop.
pub struct SourceGuard {
    registry: Arc<SourceRegistry>,
    source: Arc<ContentSource>,
}

impl SourceGuard {
    /// The shared source.
    pub fn source(&self) -> &Arc<ContentSource> {
        &self.source
    }
}

impl Deref for SourceGuard {
    type Target = ContentSource;

    fn deref(&self) -> &ContentSource {
        &self.source
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.registry.release(&self.source);
    }
}

impl std::fmt::Debug for SourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SourceGuard").field(&self.source).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FetchMode, MemoryEngine, MemoryPackage, PackageMetadata, SourceHandle};
    use crate::{EngineError, Priority};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn setup(remove_after_use: bool) -> (tempfile::TempDir, Arc<MemoryEngine>, Arc<SourceRegistry>) {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MemoryEngine::new(FetchMode::Seeded));
        engine.register(
            b"movie-descriptor".to_vec(),
            MemoryPackage::new("Movie", 16).with_sparse_file("Movie/movie.mkv", 100),
        );
        std::fs::write(dir.path().join("movie.torrent"), b"movie-descriptor").unwrap();
        std::fs::write(dir.path().join("copy.torrent"), b"movie-descriptor").unwrap();
        std::fs::write(dir.path().join("junk.torrent"), b"garbage").unwrap();
        let registry = SourceRegistry::new(engine.clone(), remove_after_use);
        (dir, engine, registry)
    }

    #[test]
    fn same_package_shares_one_source() {
        let (dir, engine, registry) = setup(true);
        let a = registry.acquire(&dir.path().join("movie.torrent")).unwrap();
        let b = registry.acquire(&dir.path().join("copy.torrent")).unwrap();

        assert!(Arc::ptr_eq(a.source(), b.source()));
        assert_eq!(engine.open_count(a.id()), 1);
        assert_eq!(registry.holders(a.id()), 2);
    }

    #[test]
    fn teardown_after_last_release() {
        let (dir, engine, registry) = setup(true);
        let a = registry.acquire(&dir.path().join("movie.torrent")).unwrap();
        let b = registry.acquire(&dir.path().join("movie.torrent")).unwrap();

        drop(a);
        assert_eq!(engine.live_sources(), 1);
        drop(b);
        assert_eq!(engine.live_sources(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn idle_sources_kept_until_shutdown() {
        let (dir, engine, registry) = setup(false);
        let guard = registry.acquire(&dir.path().join("movie.torrent")).unwrap();
        let id = guard.id().clone();
        drop(guard);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.holders(&id), 0);
        let again = registry.acquire(&dir.path().join("movie.torrent")).unwrap();
        assert_eq!(engine.open_count(&id), 1);
        drop(again);

        registry.shutdown();
        assert_eq!(engine.live_sources(), 0);
    }

    #[test]
    fn bad_descriptor_is_reported() {
        let (dir, _engine, registry) = setup(true);
        let err = registry.acquire(&dir.path().join("junk.torrent")).unwrap_err();
        assert!(matches!(err, FsError::BadDescriptor { .. }));
    }

    #[test]
    fn missing_descriptor_is_not_found() {
        let (dir, _engine, registry) = setup(true);
        let err = registry.acquire(&dir.path().join("gone.torrent")).unwrap_err();
        assert!(matches!(err, FsError::NotFound { .. }));
    }

    #[test]
    fn concurrent_acquisitions_open_once() {
        let (dir, engine, registry) = setup(true);
        let path = dir.path().join("movie.torrent");
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let guards: Vec<SourceGuard> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let path = path.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    registry.acquire(&path).unwrap()
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();

        let id = guards[0].id().clone();
        assert_eq!(engine.open_count(&id), 1);
        assert_eq!(registry.holders(&id), 8);

        drop(guards);
        assert_eq!(engine.live_sources(), 0);
    }

    #[test]
    fn stale_guard_after_shutdown_leaves_reopened_source_alone() {
        let (dir, engine, registry) = setup(true);
        let path = dir.path().join("movie.torrent");
        let old = registry.acquire(&path).unwrap();
        registry.shutdown();

        let new = registry.acquire(&path).unwrap();
        assert!(!Arc::ptr_eq(old.source(), new.source()));
        drop(old);

        assert_eq!(registry.holders(new.id()), 1);
        assert_eq!(engine.live_sources(), 1);
        assert_eq!(new.read_local(0, 4).unwrap().len(), 4);

        drop(new);
        assert_eq!(engine.live_sources(), 0);
    }

    /// Blocks `open_source` for one descriptor until the test lets it go.
    struct SlowOpen {
        inner: Arc<MemoryEngine>,
        slow: Vec<u8>,
        entered: Mutex<mpsc::Sender<()>>,
        proceed: Mutex<mpsc::Receiver<()>>,
    }

    impl ContentEngine for SlowOpen {
        fn fingerprint(&self, descriptor: &[u8]) -> Result<ContentId, EngineError> {
            self.inner.fingerprint(descriptor)
        }

        fn open_source(&self, descriptor: &[u8]) -> Result<SourceHandle, EngineError> {
            if descriptor == self.slow.as_slice() {
                let _ = self.entered.lock().send(());
                let _ = self.proceed.lock().recv();
            }
            self.inner.open_source(descriptor)
        }

        fn metadata(&self, handle: SourceHandle) -> Result<PackageMetadata, EngineError> {
            self.inner.metadata(handle)
        }

        fn have_piece(&self, handle: SourceHandle, index: u32) -> Result<bool, EngineError> {
            self.inner.have_piece(handle, index)
        }

        fn set_file_priority(
            &self,
            handle: SourceHandle,
            file_index: usize,
            priority: Priority,
        ) -> Result<(), EngineError> {
            self.inner.set_file_priority(handle, file_index, priority)
        }

        fn file_priorities(&self, handle: SourceHandle) -> Result<Vec<Priority>, EngineError> {
            self.inner.file_priorities(handle)
        }

        fn file_progress(&self, handle: SourceHandle) -> Result<Vec<u64>, EngineError> {
            self.inner.file_progress(handle)
        }

        fn set_piece_priority(
            &self,
            handle: SourceHandle,
            index: u32,
            priority: Priority,
        ) -> Result<(), EngineError> {
            self.inner.set_piece_priority(handle, index, priority)
        }

        fn set_piece_deadline(
            &self,
            handle: SourceHandle,
            index: u32,
            deadline: Duration,
        ) -> Result<(), EngineError> {
            self.inner.set_piece_deadline(handle, index, deadline)
        }

        fn read_local(
            &self,
            handle: SourceHandle,
            offset: u64,
            length: usize,
        ) -> Result<Vec<u8>, EngineError> {
            self.inner.read_local(handle, offset, length)
        }

        fn close_source(&self, handle: SourceHandle) -> Result<(), EngineError> {
            self.inner.close_source(handle)
        }
    }

    #[test]
    fn slow_open_does_not_hold_up_other_packages() {
        let (dir, inner, _) = setup(true);
        inner.register(
            b"album-descriptor".to_vec(),
            MemoryPackage::new("Album", 16).with_sparse_file("Album/01.flac", 40),
        );
        std::fs::write(dir.path().join("album.torrent"), b"album-descriptor").unwrap();

        let (entered_tx, entered_rx) = mpsc::channel();
        let (proceed_tx, proceed_rx) = mpsc::channel();
        let engine = Arc::new(SlowOpen {
            inner: inner.clone(),
            slow: b"movie-descriptor".to_vec(),
            entered: Mutex::new(entered_tx),
            proceed: Mutex::new(proceed_rx),
        });
        let registry = SourceRegistry::new(engine, true);

        let album = registry.acquire(&dir.path().join("album.torrent")).unwrap();
        let slow = {
            let registry = registry.clone();
            let path = dir.path().join("movie.torrent");
            thread::spawn(move || registry.acquire(&path).map(|g| g.id().clone()))
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // The movie is still opening; the album must stay usable meanwhile.
        let again = registry.acquire(&dir.path().join("album.torrent")).unwrap();
        assert_eq!(registry.holders(album.id()), 2);
        drop(again);
        drop(album);
        assert_eq!(inner.live_sources(), 0);

        proceed_tx.send(()).unwrap();
        let movie = slow.join().unwrap().unwrap();
        assert_eq!(inner.open_count(&movie), 1);
        assert_eq!(inner.live_sources(), 0);
    }
}
