//! # Filesystem Traits
//!
//! The surface a mount adapter drives. Each trait covers one group of
//! callbacks, and [`FsProjection`] ties them together:
//!
//! ```text
//! FsRead + FsDir + FsStats + FsHandles = FsProjection
//! ```
//!
//! ## Blanket Implementation
//!
//! [`FsProjection`] is implemented for every type that implements the four
//! component traits, so adapters can be written once against it:
//!
//! ```rust
//! use torrentfs::{FsError, FsProjection};
//! use std::path::Path;
//!
//! fn size_of<B: FsProjection>(fs: &B, path: &Path) -> Result<u64, FsError> {
//!     Ok(fs.metadata(path)?.size)
//! }
//! ```
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` and take `&self`. A blocking read on one
//! thread must not hold up attribute or listing calls on another.

mod fs_dir;
mod fs_handles;
mod fs_read;
mod fs_stats;

pub use fs_dir::{FsDir, ReadDirIter};
pub use fs_handles::FsHandles;
pub use fs_read::FsRead;
pub use fs_stats::FsStats;

/// Everything a read-only mount needs.
///
/// Automatically implemented for any type implementing [`FsRead`],
/// [`FsDir`], [`FsStats`] and [`FsHandles`].
pub trait FsProjection: FsRead + FsDir + FsStats + FsHandles {}

impl<T: FsRead + FsDir + FsStats + FsHandles> FsProjection for T {}
