//! Handle-based reads.
//!
//! Mount callbacks open a file once and then issue many positioned reads
//! against the handle. For package entries the handle also keeps the
//! content source held, so the engine does not tear it down between reads.
//!
//! 1. `open()` - resolve a path and get a handle
//! 2. `read_at()` - positioned reads through the handle
//! 3. `close()` - release the handle and whatever it holds

use std::path::Path;

use crate::{FsError, Handle};

/// Handle-based file operations.
///
/// # Example
///
/// ```rust
/// use torrentfs::{FsHandles, FsError};
/// use std::path::Path;
///
/// fn read_header<B: FsHandles>(backend: &B, path: &Path) -> Result<Vec<u8>, FsError> {
///     let handle = backend.open(path)?;
///     let header = backend.read_at(handle, 0, 16);
///     backend.close(handle)?;
///     header
/// }
/// ```
pub trait FsHandles: Send + Sync {
    /// Open a file for reading and return a handle.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the file does not exist
    /// - [`FsError::IsADirectory`] if the path is a directory or a package root
    fn open(&self, path: &Path) -> Result<Handle, FsError>;

    /// Read up to `len` bytes at `offset`.
    ///
    /// Returns fewer bytes at end of file and an empty vector past it.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidHandle`] if the handle is invalid or closed
    /// - [`FsError::FetchTimeout`] if content pieces do not arrive in time
    fn read_at(&self, handle: Handle, offset: u64, len: usize) -> Result<Vec<u8>, FsError>;

    /// Close a file handle.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidHandle`] if the handle is already closed or invalid
    fn close(&self, handle: Handle) -> Result<(), FsError>;
}
