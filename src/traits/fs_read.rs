//! Path-based read operations.

use std::path::Path;

use crate::{FsError, StatInfo};

/// Read operations addressed by virtual path.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`. Methods use `&self` so that a
/// mount can serve many callbacks at once.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FsRead`.
pub trait FsRead: Send + Sync {
    /// Attributes of `path`.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not exist
    /// - [`FsError::BadDescriptor`] if a descriptor on the path is malformed
    fn metadata(&self, path: &Path) -> Result<StatInfo, FsError>;

    /// Check if a path exists.
    ///
    /// Returns `Ok(false)` for missing paths; only unexpected failures are
    /// errors.
    fn exists(&self, path: &Path) -> Result<bool, FsError>;

    /// Read up to `len` bytes at `offset` without keeping a handle open.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not exist
    /// - [`FsError::IsADirectory`] if the path is a directory
    /// - [`FsError::FetchTimeout`] if content pieces do not arrive in time
    fn read_range(&self, path: &Path, offset: u64, len: usize) -> Result<Vec<u8>, FsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_read_is_object_safe() {
        fn _check(_: &dyn FsRead) {}
    }

    #[test]
    fn fs_read_requires_send_sync() {
        fn _assert_send_sync<T: Send + Sync>() {}
        fn _check<T: FsRead>() {
            _assert_send_sync::<T>();
        }
    }
}
