//! Filesystem statistics.

use std::path::Path;

use crate::{FsError, FsStatInfo};

/// Filesystem statistics operations.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FsStats`.
pub trait FsStats: Send + Sync {
    /// Capacity of the filesystem holding `path`.
    ///
    /// # Errors
    ///
    /// - [`FsError::Io`] if the underlying `statvfs` call fails
    fn statfs(&self, path: &Path) -> Result<FsStatInfo, FsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_stats_is_object_safe() {
        fn _check(_: &dyn FsStats) {}
    }
}
