//! # Extension Traits
//!
//! Convenience queries on top of [`FsRead`], implemented once for every
//! backend through a blanket implementation.
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`is_file`](FsExt::is_file) | Check if path is presented as a regular file |
//! | [`is_dir`](FsExt::is_dir) | Check if path is presented as a directory |
//! | [`file_size`](FsExt::file_size) | Presented size of a file |

use std::path::Path;

use crate::{FsError, FsRead};

/// Extension methods for any [`FsRead`] backend.
///
/// # Example
///
/// ```rust
/// use torrentfs::{FsExt, FsError, FsRead};
/// use std::path::Path;
///
/// fn is_package<B: FsRead>(backend: &B, path: &Path) -> Result<bool, FsError> {
///     // A descriptor file is listed under its stem and presented as a directory.
///     backend.is_dir(path)
/// }
/// ```
pub trait FsExt: FsRead {
    /// Check if the path is presented as a regular file.
    ///
    /// Returns `Ok(false)` if the path doesn't exist.
    fn is_file(&self, path: &Path) -> Result<bool, FsError> {
        match self.metadata(path) {
            Ok(m) => Ok(m.is_file()),
            Err(FsError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check if the path is presented as a directory.
    ///
    /// Returns `Ok(false)` if the path doesn't exist.
    fn is_dir(&self, path: &Path) -> Result<bool, FsError> {
        match self.metadata(path) {
            Ok(m) => Ok(m.is_dir()),
            Err(FsError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Presented size of the file at `path`.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not exist
    /// - [`FsError::IsADirectory`] if the path is a directory
    fn file_size(&self, path: &Path) -> Result<u64, FsError> {
        let meta = self.metadata(path)?;
        if meta.is_dir() {
            return Err(FsError::IsADirectory {
                path: path.to_path_buf(),
            });
        }
        Ok(meta.size)
    }
}

impl<T: FsRead + ?Sized> FsExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatInfo;
    use crate::types::{DIR_MODE, S_IFREG};

    struct Fixed;

    impl FsRead for Fixed {
        fn metadata(&self, path: &Path) -> Result<StatInfo, FsError> {
            match path.to_str() {
                Some("/movie") => Ok(StatInfo {
                    mode: DIR_MODE,
                    ..StatInfo::default()
                }),
                Some("/movie/movie.mkv") => Ok(StatInfo {
                    mode: S_IFREG | 0o444,
                    size: 1_000_000_000,
                    ..StatInfo::default()
                }),
                Some("/broken") => Err(FsError::BadDescriptor {
                    path: path.to_path_buf(),
                    reason: "truncated".into(),
                }),
                _ => Err(FsError::NotFound {
                    path: path.to_path_buf(),
                }),
            }
        }

        fn exists(&self, path: &Path) -> Result<bool, FsError> {
            Ok(self.metadata(path).is_ok())
        }

        fn read_range(&self, _: &Path, _: u64, _: usize) -> Result<Vec<u8>, FsError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn kinds() {
        assert!(Fixed.is_dir(Path::new("/movie")).unwrap());
        assert!(!Fixed.is_file(Path::new("/movie")).unwrap());
        assert!(Fixed.is_file(Path::new("/movie/movie.mkv")).unwrap());
    }

    #[test]
    fn missing_is_false_not_error() {
        assert!(!Fixed.is_file(Path::new("/nope")).unwrap());
        assert!(!Fixed.is_dir(Path::new("/nope")).unwrap());
    }

    #[test]
    fn other_errors_propagate() {
        assert!(matches!(
            Fixed.is_dir(Path::new("/broken")),
            Err(FsError::BadDescriptor { .. })
        ));
    }

    #[test]
    fn file_size() {
        assert_eq!(Fixed.file_size(Path::new("/movie/movie.mkv")).unwrap(), 1_000_000_000);
        assert!(matches!(
            Fixed.file_size(Path::new("/movie")),
            Err(FsError::IsADirectory { .. })
        ));
    }
}
