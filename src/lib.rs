//! # torrentfs
//!
//! Presents a directory tree in which content-package descriptors
//! (`.torrent` files) appear as ordinary directories. Listing one shows the
//! files the package contains; reading one of those files streams it from
//! the package's content engine, fetching the pieces a read needs first and
//! the pieces after it next.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust
//! use std::path::Path;
//! use std::sync::Arc;
//! use torrentfs::{FetchMode, FsConfig, FsHandles, MemoryEngine, MemoryPackage, TorrentFs};
//!
//! let root = tempfile::tempdir()?;
//! let engine = Arc::new(MemoryEngine::new(FetchMode::Seeded));
//! engine.register(
//!     b"d8:announce...".to_vec(),
//!     MemoryPackage::new("Album", 16_384).with_file("Album/01.flac", b"fLaC".to_vec()),
//! );
//! std::fs::write(root.path().join("album.torrent"), b"d8:announce...")?;
//!
//! let fs = TorrentFs::new(root.path(), engine, FsConfig::default());
//! assert_eq!(fs.list_directory(Path::new("/album"))?, [".", "..", "01.flac"]);
//!
//! let handle = fs.open(Path::new("/album/01.flac"))?;
//! assert_eq!(fs.read(handle, 4, 0)?, b"fLaC");
//! fs.release(handle)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`TorrentFs`] | The projection a mount adapter drives |
//! | [`PathResolver`] | Virtual path to real path, descriptor or package entry |
//! | [`SourceRegistry`] | One shared, reference-counted [`ContentSource`] per package |
//! | [`NamespaceProjector`] | Directory levels synthesized from a flat file list |
//! | [`AttributeSynthesizer`] | `stat` results for every kind of path |
//! | [`StreamingScheduler`] | Piece priorities and deadlines for byte-range reads |
//! | [`ContentEngine`] | The download engine boundary |
//! | [`FsError`] | Error type with errno mapping |
//!
//! ---
//!
//! ## Path Semantics
//!
//! ```text
//! backing tree                 projected view
//! ------------                 --------------
//! /docs/readme.txt             /docs/readme.txt       (pass-through)
//! /movie.torrent               /movie/                (dr-xr-xr-x)
//!   MovieRelease/movie.mkv     /movie/movie.mkv       (size from the package)
//!   MovieRelease/extras/a.srt  /movie/extras/a.srt
//! ```
//!
//! The shallowest descriptor on a path binds; descriptors inside a package
//! are not resolved again.
//!
//! ---
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync` and every method takes `&self`. Any
//! number of threads may call into one [`TorrentFs`]; a read blocked on
//! piece arrival holds no lock other callers need.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Serialization for [`StatInfo`], [`DirEntry`], [`FsConfig`], etc., and [`FsConfig::from_json`] |

// Private modules
mod attributes;
mod config;
mod context;
mod engine;
mod error;
mod ext;
mod fs;
mod projector;
mod registry;
mod resolver;
mod scheduler;
mod source;
mod traits;
mod types;

// Public re-exports - error types
pub use error::{EngineError, FsError};

// Public re-exports - core types
pub use types::{DIR_MODE, DirEntry, FileKind, FsStatInfo, Handle, Priority, S_IFDIR, S_IFMT, S_IFREG, StatInfo};

// Public re-exports - configuration
pub use config::{DEFAULT_DESCRIPTOR_SUFFIX, FsConfig, SchedulerOptions, TimeoutOptions};

// Public re-exports - content engine boundary
pub use engine::{
    ContentEngine, ContentId, FetchMode, MemoryEngine, MemoryPackage, PackageFile, PackageMetadata,
    SourceHandle,
};

// Public re-exports - projection components
pub use attributes::{AttributeSynthesizer, stat_path};
pub use context::Context;
pub use projector::{Classification, NamespaceProjector};
pub use registry::{SourceGuard, SourceRegistry};
pub use resolver::{PathResolver, Resolution};
pub use scheduler::{Interrupt, PieceWindow, StreamingScheduler};
pub use source::{ContentEntry, ContentSource, normalize_internal_path};

// Public re-exports - adapter surface
pub use ext::FsExt;
pub use fs::TorrentFs;
pub use traits::{FsDir, FsHandles, FsProjection, FsRead, FsStats, ReadDirIter};
