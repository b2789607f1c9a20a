//! Directory listing.

use std::path::Path;

use crate::{DirEntry, FsError};

/// Directory operations for a virtual filesystem.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`. Methods use `&self` to allow
/// concurrent access.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FsDir`.
pub trait FsDir: Send + Sync {
    /// List directory contents, without `.` and `..`.
    ///
    /// The outer `Result` indicates whether the directory could be listed;
    /// each item's `Result` indicates whether that entry could be read.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not exist
    /// - [`FsError::NotADirectory`] if the path is not a directory
    fn read_dir(&self, path: &Path) -> Result<ReadDirIter, FsError>;
}

/// Iterator over directory entries.
///
/// - Outer `Result` (from [`FsDir::read_dir`]) = "can I list this directory?"
/// - Inner `Result` (per item) = "can I read this entry?"
///
/// # Example
///
/// ```rust
/// use torrentfs::{FsDir, FsError};
/// use std::path::Path;
///
/// fn list_names<B: FsDir>(backend: &B, path: &Path) -> Result<Vec<String>, FsError> {
///     let mut names = Vec::new();
///     for entry in backend.read_dir(path)? {
///         names.push(entry?.name);
///     }
///     Ok(names)
/// }
/// ```
pub struct ReadDirIter(Box<dyn Iterator<Item = Result<DirEntry, FsError>> + Send + 'static>);

impl ReadDirIter {
    /// Create from any compatible iterator.
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<DirEntry, FsError>> + Send + 'static,
    {
        Self(Box::new(iter))
    }

    /// Create from a pre-collected vector.
    pub fn from_vec(entries: Vec<Result<DirEntry, FsError>>) -> Self {
        Self(Box::new(entries.into_iter()))
    }

    /// Collect all entries, short-circuiting on first error.
    pub fn collect_all(self) -> Result<Vec<DirEntry>, FsError> {
        self.collect()
    }
}

impl Iterator for ReadDirIter {
    type Item = Result<DirEntry, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl std::fmt::Debug for ReadDirIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReadDirIter")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileKind;
    use std::path::PathBuf;

    #[test]
    fn read_dir_iter_from_vec() {
        let entries = vec![
            Ok(DirEntry::new("movie.mkv", FileKind::File)),
            Ok(DirEntry::new("extras", FileKind::Directory)),
        ];
        let collected: Vec<_> = ReadDirIter::from_vec(entries).collect();
        assert_eq!(collected.len(), 2);
    }

    #[test]
    fn read_dir_iter_collect_all_success() {
        let iter = ReadDirIter::new(std::iter::once(Ok(DirEntry::new("a", FileKind::File))));
        let entries = iter.collect_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a");
    }

    #[test]
    fn read_dir_iter_collect_all_error() {
        let entries = vec![
            Ok(DirEntry::new("a", FileKind::File)),
            Err(FsError::NotFound {
                path: PathBuf::from("/b"),
            }),
        ];
        assert!(ReadDirIter::from_vec(entries).collect_all().is_err());
    }

    #[test]
    fn read_dir_iter_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ReadDirIter>();
    }
}
