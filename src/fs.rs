//! # Filesystem Adapter
//!
//! [`TorrentFs`] is the object a mount layer drives. It resolves each path,
//! then either passes the call through to the backing tree or answers it
//! from a package held in the [`SourceRegistry`](crate::SourceRegistry).
//!
//! ```text
//! getattr  -> PathResolver -> AttributeSynthesizer
//! readdir  -> PathResolver -> real listing + NamespaceProjector
//! open     -> PathResolver -> File | SourceGuard (held until release)
//! read     -> handle table  -> pread | StreamingScheduler
//! ```
//!
//! All operations take `&self`. Reads that block on piece arrival hold only
//! their own handle, so attribute and listing calls on other threads keep
//! going.

use std::collections::{HashMap, HashSet};
use std::ffi::CString;
use std::fs::File;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::attributes::AttributeSynthesizer;
use crate::config::FsConfig;
use crate::context::Context;
use crate::engine::ContentEngine;
use crate::projector::{Classification, NamespaceProjector};
use crate::registry::SourceGuard;
use crate::resolver::{PathResolver, Resolution};
use crate::scheduler::{Interrupt, StreamingScheduler};
use crate::source::{ContentEntry, ContentSource};
use crate::traits::{FsDir, FsHandles, FsRead, FsStats, ReadDirIter};
use crate::{DirEntry, FileKind, FsError, FsStatInfo, Handle, Priority, StatInfo};

/// What an open handle refers to.
enum OpenFile {
    Real {
        path: PathBuf,
        file: File,
    },
    Content {
        path: PathBuf,
        source: SourceGuard,
        index: usize,
    },
}

/// Read-only projection of a directory tree with packages shown as folders.
///
/// # Example
///
/// ```rust,no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use torrentfs::{FetchMode, FsConfig, FsHandles, MemoryEngine, TorrentFs};
///
/// let engine = Arc::new(MemoryEngine::new(FetchMode::OnDeadline));
/// let fs = TorrentFs::new("/srv/media", engine, FsConfig::default());
///
/// for name in fs.list_directory(Path::new("/movie"))? {
///     println!("{name}");
/// }
/// let handle = fs.open(Path::new("/movie/movie.mkv"))?;
/// let head = fs.read(handle, 65_536, 0)?;
/// fs.release(handle)?;
/// # Ok::<(), torrentfs::FsError>(())
/// ```
pub struct TorrentFs {
    context: Context,
    resolver: PathResolver,
    attributes: AttributeSynthesizer,
    scheduler: StreamingScheduler,
    handles: RwLock<HashMap<u64, Arc<OpenFile>>>,
    next_handle: AtomicU64,
}

impl TorrentFs {
    /// Project the tree under `root`, opening packages through `engine`.
    pub fn new(root: impl Into<PathBuf>, engine: Arc<dyn ContentEngine>, config: FsConfig) -> Self {
        let root = root.into();
        let resolver = PathResolver::new(root.clone(), config.descriptor_suffix.clone());
        let scheduler = StreamingScheduler::new(config.scheduler.clone(), config.timeouts.clone());
        let context = Context::new(&root, engine, config);
        let attributes = AttributeSynthesizer::new(context.registry().clone());

        info!(
            parent: context.span(),
            suffix = resolver.suffix(),
            remove_after_use = context.config().remove_after_use,
            "projection ready"
        );

        Self {
            context,
            resolver,
            attributes,
            scheduler,
            handles: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Session context shared by the components.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Backing root directory.
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    /// Resolve a virtual path without touching any package.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path exists nowhere
    pub fn resolve(&self, path: &Path) -> Result<Resolution, FsError> {
        self.resolver.resolve(path)
    }

    /// Stat-equivalent attributes of `path`.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path exists neither in a package nor
    ///   in the backing tree
    /// - [`FsError::BadDescriptor`] if a descriptor on the path is malformed
    pub fn get_attributes(&self, path: &Path) -> Result<StatInfo, FsError> {
        let _span = self.context.span().enter();
        let resolution = self.resolver.resolve(path)?;
        self.attributes.attributes(&resolution)
    }

    /// Names in the directory at `path`, starting with `.` and `..`.
    ///
    /// Descriptor files are listed under their stem. Inside a package the
    /// package's entries come first, followed by real entries of a
    /// coexisting directory that the package does not already name.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not exist
    /// - [`FsError::NotADirectory`] if the path is a file
    pub fn list_directory(&self, path: &Path) -> Result<Vec<String>, FsError> {
        let entries = self.entries(path)?;
        let mut names = Vec::with_capacity(entries.len() + 2);
        names.push(".".to_owned());
        names.push("..".to_owned());
        names.extend(entries.into_iter().map(|entry| entry.name));
        Ok(names)
    }

    /// Read up to `length` bytes at `offset` through `handle`.
    ///
    /// Blocks until the needed pieces of a package entry arrive.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidHandle`] if the handle is not open
    /// - [`FsError::FetchTimeout`] if the pieces do not arrive in time
    pub fn read(&self, handle: Handle, length: usize, offset: u64) -> Result<Vec<u8>, FsError> {
        self.read_interruptible(handle, length, offset, &Interrupt::new())
    }

    /// Like [`read`](Self::read), abandoning the wait once `interrupt` trips.
    ///
    /// # Errors
    ///
    /// - [`FsError::Interrupted`] if `interrupt` trips while waiting
    /// - everything [`read`](Self::read) returns
    pub fn read_interruptible(
        &self,
        handle: Handle,
        length: usize,
        offset: u64,
        interrupt: &Interrupt,
    ) -> Result<Vec<u8>, FsError> {
        let _span = self.context.span().enter();
        let open = self
            .handles
            .read()
            .get(&handle.0)
            .cloned()
            .ok_or(FsError::InvalidHandle { handle })?;

        match &*open {
            OpenFile::Real { path, file } => read_real(file, path, offset, length),
            OpenFile::Content {
                path,
                source,
                index,
            } => {
                let entry = source
                    .entry(*index)
                    .ok_or_else(|| FsError::NotFound { path: path.clone() })?;
                self.scheduler.read(source, entry, offset, length, interrupt)
            }
        }
    }

    /// Open `path`, read a range and release the handle again.
    ///
    /// # Errors
    ///
    /// Everything [`FsHandles::open`] and
    /// [`read_interruptible`](Self::read_interruptible) return.
    pub fn read_path(
        &self,
        path: &Path,
        offset: u64,
        length: usize,
        interrupt: &Interrupt,
    ) -> Result<Vec<u8>, FsError> {
        let handle = FsHandles::open(self, path)?;
        let result = self.read_interruptible(handle, length, offset, interrupt);
        self.release(handle)?;
        result
    }

    /// Close `handle`, dropping its hold on a package.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidHandle`] if the handle is not open
    pub fn release(&self, handle: Handle) -> Result<(), FsError> {
        let _span = self.context.span().enter();
        let open = self
            .handles
            .write()
            .remove(&handle.0)
            .ok_or(FsError::InvalidHandle { handle })?;
        let path = match &*open {
            OpenFile::Real { path, .. } | OpenFile::Content { path, .. } => path,
        };
        debug!(handle = handle.0, path = %path.display(), "released");
        Ok(())
    }

    /// Capacity of the filesystem holding the backing tree.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if `path` does not exist
    /// - [`FsError::Io`] if `statvfs` fails
    pub fn get_filesystem_stats(&self, path: &Path) -> Result<FsStatInfo, FsError> {
        let _span = self.context.span().enter();
        self.resolver.resolve(path)?;
        statvfs(self.resolver.root())
    }

    /// Set the fetch priority of the package entry at `path`.
    ///
    /// Lasts as long as the package stays open, for example while a handle
    /// on it is held.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if `path` is not a package entry
    /// - [`FsError::IsADirectory`] if `path` is a package directory
    pub fn set_priority(&self, path: &Path, priority: Priority) -> Result<(), FsError> {
        self.with_entry(path, |source, entry| source.set_priority(entry, priority))
    }

    /// Fetch only the package entry at `path`, skipping its siblings.
    ///
    /// # Errors
    ///
    /// Same as [`set_priority`](Self::set_priority).
    pub fn download_only(&self, path: &Path) -> Result<(), FsError> {
        self.with_entry(path, |source, entry| source.download_only(entry))
    }

    /// Percentage of the package entry at `path` downloaded so far.
    ///
    /// # Errors
    ///
    /// Same as [`set_priority`](Self::set_priority).
    pub fn completed_percent(&self, path: &Path) -> Result<f64, FsError> {
        self.with_entry(path, |source, entry| source.completed_percent(entry))
    }

    /// Drop every open handle and close every package.
    pub fn shutdown(&self) {
        let _span = self.context.span().enter();
        let dropped = {
            let mut handles = self.handles.write();
            let count = handles.len();
            handles.clear();
            count
        };
        self.context.registry().shutdown();
        info!(dropped_handles = dropped, "projection shut down");
    }

    fn with_entry<T>(
        &self,
        path: &Path,
        f: impl FnOnce(&ContentSource, &ContentEntry) -> Result<T, FsError>,
    ) -> Result<T, FsError> {
        let _span = self.context.span().enter();
        let resolution = self.resolver.resolve(path)?;
        let Resolution::Content { descriptor, .. } = &resolution else {
            return Err(FsError::NotFound {
                path: path.to_path_buf(),
            });
        };
        let guard = self.context.registry().acquire(descriptor)?;
        let source: &ContentSource = &guard;
        match NamespaceProjector::new(source).classify(resolution.sub_path()) {
            Classification::File(entry) => f(source, entry),
            Classification::Directory => Err(FsError::IsADirectory {
                path: path.to_path_buf(),
            }),
            Classification::None => Err(FsError::NotFound {
                path: path.to_path_buf(),
            }),
        }
    }

    fn entries(&self, path: &Path) -> Result<Vec<DirEntry>, FsError> {
        let _span = self.context.span().enter();
        let resolution = self.resolver.resolve(path)?;
        let descriptor = match &resolution {
            Resolution::RealFile { .. } => {
                return Err(FsError::NotADirectory {
                    path: path.to_path_buf(),
                });
            }
            Resolution::RealDirectory { path: real } => return self.real_entries(real, true),
            Resolution::Descriptor { descriptor, .. } | Resolution::Content { descriptor, .. } => {
                descriptor
            }
        };

        let source = self.context.registry().acquire(descriptor)?;
        let projector = NamespaceProjector::new(&source);
        let real = resolution.real_path();

        match projector.classify(resolution.sub_path()) {
            Classification::File(_) => Err(FsError::NotADirectory {
                path: path.to_path_buf(),
            }),
            Classification::Directory => {
                let mut children = projector.list_children(resolution.sub_path());
                if real.is_dir() {
                    let mut seen: HashSet<String> =
                        children.iter().map(|c| c.name.clone()).collect();
                    for entry in self.real_entries(&real, false)? {
                        if seen.insert(entry.name.clone()) {
                            children.push(entry);
                        }
                    }
                }
                debug!(path = %path.display(), children = children.len(), "listed package directory");
                Ok(children)
            }
            Classification::None if real.is_dir() => self.real_entries(&real, false),
            Classification::None if real.symlink_metadata().is_ok() => Err(FsError::NotADirectory {
                path: path.to_path_buf(),
            }),
            Classification::None => Err(FsError::NotFound {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Entries of a real directory. With `descriptors` set, descriptor files
    /// are shown as directories under their stem; inside a package they are
    /// plain files.
    fn real_entries(&self, dir: &Path, descriptors: bool) -> Result<Vec<DirEntry>, FsError> {
        let listing = std::fs::read_dir(dir).map_err(|e| FsError::io("read_dir", dir, e))?;
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for item in listing {
            let item = item.map_err(|e| FsError::io("read_dir", dir, e))?;
            let file_name = item.file_name();
            let name = file_name.to_string_lossy();
            let file_type = item.file_type().map_err(|e| FsError::io("read_dir", item.path(), e))?;

            let entry = match self.resolver.logical_name(&name) {
                Some(stem) if descriptors && item.path().is_file() => DirEntry::new(stem, FileKind::Directory),
                _ => DirEntry::new(name.into_owned(), kind_of(file_type)),
            };
            if seen.insert(entry.name.clone()) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn open_real(path: &Path, real: &Path) -> Result<OpenFile, FsError> {
        let file = File::open(real).map_err(|e| FsError::io("open", path, e))?;
        Ok(OpenFile::Real {
            path: path.to_path_buf(),
            file,
        })
    }
}

fn kind_of(file_type: std::fs::FileType) -> FileKind {
    if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_file() {
        FileKind::File
    } else if file_type.is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::Other
    }
}

fn read_real(file: &File, path: &Path, offset: u64, length: usize) -> Result<Vec<u8>, FsError> {
    let mut buf = vec![0; length];
    let mut filled = 0;
    while filled < length {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FsError::io("read", path, e)),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

fn statvfs(path: &Path) -> Result<FsStatInfo, FsError> {
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|e| {
        FsError::io(
            "statfs",
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        )
    })?;
    let mut raw = std::mem::MaybeUninit::<libc::statvfs>::uninit();
    // SAFETY: `c_path` is NUL-terminated and `raw` is valid for writes.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), raw.as_mut_ptr()) };
    if rc != 0 {
        return Err(FsError::io("statfs", path, std::io::Error::last_os_error()));
    }
    // SAFETY: statvfs returned 0, so the struct is initialized.
    let raw = unsafe { raw.assume_init() };

    let fragment_size = raw.f_frsize as u64;
    Ok(FsStatInfo {
        total_bytes: raw.f_blocks as u64 * fragment_size,
        free_bytes: raw.f_bfree as u64 * fragment_size,
        available_bytes: raw.f_bavail as u64 * fragment_size,
        total_inodes: raw.f_files as u64,
        free_inodes: raw.f_ffree as u64,
        block_size: raw.f_bsize as u64,
        fragment_size,
        max_name_len: raw.f_namemax as u64,
    })
}

impl FsRead for TorrentFs {
    fn metadata(&self, path: &Path) -> Result<StatInfo, FsError> {
        self.get_attributes(path)
    }

    fn exists(&self, path: &Path) -> Result<bool, FsError> {
        match self.get_attributes(path) {
            Ok(_) => Ok(true),
            Err(FsError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read_range(&self, path: &Path, offset: u64, len: usize) -> Result<Vec<u8>, FsError> {
        self.read_path(path, offset, len, &Interrupt::new())
    }
}

impl FsDir for TorrentFs {
    fn read_dir(&self, path: &Path) -> Result<ReadDirIter, FsError> {
        let entries = self.entries(path)?;
        Ok(ReadDirIter::new(entries.into_iter().map(Ok)))
    }
}

impl FsStats for TorrentFs {
    fn statfs(&self, path: &Path) -> Result<FsStatInfo, FsError> {
        self.get_filesystem_stats(path)
    }
}

impl FsHandles for TorrentFs {
    fn open(&self, path: &Path) -> Result<Handle, FsError> {
        let _span = self.context.span().enter();
        let resolution = self.resolver.resolve(path)?;

        let open = match &resolution {
            Resolution::RealDirectory { .. } | Resolution::Descriptor { .. } => {
                return Err(FsError::IsADirectory {
                    path: path.to_path_buf(),
                });
            }
            Resolution::RealFile { path: real } => Self::open_real(path, real)?,
            Resolution::Content { descriptor, .. } => {
                let source = self.context.registry().acquire(descriptor)?;
                let index = match NamespaceProjector::new(&source).classify(resolution.sub_path()) {
                    Classification::File(entry) => Some(entry.index()),
                    Classification::Directory => {
                        return Err(FsError::IsADirectory {
                            path: path.to_path_buf(),
                        });
                    }
                    Classification::None => None,
                };
                match index {
                    Some(index) => OpenFile::Content {
                        path: path.to_path_buf(),
                        source,
                        index,
                    },
                    None => {
                        drop(source);
                        let real = resolution.real_path();
                        if real.is_dir() {
                            return Err(FsError::IsADirectory {
                                path: path.to_path_buf(),
                            });
                        }
                        Self::open_real(path, &real)?
                    }
                }
            }
        };

        let handle = Handle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.handles.write().insert(handle.0, Arc::new(open));
        debug!(handle = handle.0, path = %path.display(), "opened");
        Ok(handle)
    }

    fn read_at(&self, handle: Handle, offset: u64, len: usize) -> Result<Vec<u8>, FsError> {
        self.read(handle, len, offset)
    }

    fn close(&self, handle: Handle) -> Result<(), FsError> {
        self.release(handle)
    }
}

impl std::fmt::Debug for TorrentFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorrentFs")
            .field("root", &self.resolver.root())
            .field("suffix", &self.resolver.suffix())
            .field("open_handles", &self.handles.read().len())
            .finish()
    }
}
