//! Error types for the torrentfs projection.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::SourceHandle;
use crate::Handle;

/// Filesystem error type with contextual variants.
///
/// Every variant carries the virtual or real path it concerns where one
/// exists. Use [`FsError::errno`] to translate an error into the reply code
/// a userspace filesystem binding sends back to the kernel.
///
/// # Examples
///
/// ```rust
/// use torrentfs::FsError;
/// use std::path::PathBuf;
///
/// let err = FsError::NotFound { path: PathBuf::from("/movie/missing.mkv") };
/// assert_eq!(err.to_string(), "not found: /movie/missing.mkv");
/// assert_eq!(err.errno(), libc::ENOENT);
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Path resolves to neither a real entry nor a content entry.
    #[error("not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Expected a directory but found something else.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The path that is not a directory.
        path: PathBuf,
    },

    /// Expected a file but found a directory.
    #[error("is a directory: {path}")]
    IsADirectory {
        /// The path that is a directory.
        path: PathBuf,
    },

    /// A file carrying the descriptor suffix could not be parsed.
    #[error("bad descriptor: {path} ({reason})")]
    BadDescriptor {
        /// The descriptor file.
        path: PathBuf,
        /// Why the engine rejected it.
        reason: String,
    },

    /// Pieces needed by a read did not arrive within the configured bound.
    #[error("fetch timeout after {waited:?}: {path} (pieces {pieces:?})")]
    FetchTimeout {
        /// The file being read.
        path: PathBuf,
        /// The pieces that were still missing.
        pieces: RangeInclusive<u32>,
        /// How long the read waited.
        waited: Duration,
    },

    /// The read was cancelled while waiting for pieces.
    #[error("interrupted: {path}")]
    Interrupted {
        /// The file being read.
        path: PathBuf,
    },

    /// File handle is invalid or already released.
    #[error("invalid handle: {}", handle.0)]
    InvalidHandle {
        /// The invalid handle.
        handle: Handle,
    },

    /// The content engine failed.
    #[error("content engine error for {path}: {source}")]
    Engine {
        /// The descriptor or virtual path involved.
        path: PathBuf,
        /// The engine failure.
        #[source]
        source: EngineError,
    },

    /// I/O error with context.
    #[error("{operation} failed for {path}: {source}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// The path involved in the operation.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    /// Wrap an I/O error, keeping `NotFound` distinguishable.
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound { path },
            _ => FsError::Io {
                operation,
                path,
                source,
            },
        }
    }

    /// Wrap an engine error, lifting descriptor failures to [`FsError::BadDescriptor`].
    pub(crate) fn engine(path: impl Into<PathBuf>, source: EngineError) -> Self {
        let path = path.into();
        match source {
            EngineError::BadDescriptor { reason } => FsError::BadDescriptor { path, reason },
            source => FsError::Engine { path, source },
        }
    }

    /// POSIX errno for this error.
    ///
    /// Malformed descriptors and engine failures are reported as `EIO` so a
    /// corrupted package is flagged rather than shown as a plain file.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound { .. } => libc::ENOENT,
            FsError::NotADirectory { .. } => libc::ENOTDIR,
            FsError::IsADirectory { .. } => libc::EISDIR,
            FsError::BadDescriptor { .. } => libc::EIO,
            FsError::FetchTimeout { .. } => libc::ETIMEDOUT,
            FsError::Interrupted { .. } => libc::EINTR,
            FsError::InvalidHandle { .. } => libc::EBADF,
            FsError::Engine { .. } => libc::EIO,
            FsError::Io { source, .. } => source.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// Returns `true` for errors a caller may retry later.
    pub fn is_transient(&self) -> bool {
        matches!(self, FsError::FetchTimeout { .. } | FsError::Interrupted { .. })
    }
}

impl From<std::io::Error> for FsError {
    fn from(error: std::io::Error) -> Self {
        FsError::io("io", PathBuf::new(), error)
    }
}

/// Errors reported by a [`ContentEngine`](crate::ContentEngine).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The descriptor bytes are not a valid package.
    #[error("bad descriptor: {reason}")]
    BadDescriptor {
        /// Parser diagnostic.
        reason: String,
    },

    /// The handle does not name a live source.
    #[error("unknown source: {0}")]
    UnknownSource(SourceHandle),

    /// A piece index beyond the package's piece count.
    #[error("piece {index} out of range (package has {count} pieces)")]
    PieceOutOfRange {
        /// Requested piece.
        index: u32,
        /// Number of pieces in the package.
        count: u32,
    },

    /// Local storage could not be read.
    #[error("local storage: {0}")]
    Io(#[from] std::io::Error),

    /// Generic engine failure.
    #[error("engine error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = FsError::NotFound {
            path: PathBuf::from("/missing"),
        };
        assert_eq!(err.to_string(), "not found: /missing");
    }

    #[test]
    fn bad_descriptor_is_io_error() {
        let err = FsError::engine(
            "/pkgs/movie.torrent",
            EngineError::BadDescriptor {
                reason: "truncated".into(),
            },
        );
        assert!(matches!(err, FsError::BadDescriptor { .. }));
        assert_eq!(err.errno(), libc::EIO);
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn engine_error_keeps_source() {
        let err = FsError::engine("/movie", EngineError::UnknownSource(SourceHandle(9)));
        assert!(matches!(err, FsError::Engine { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn fetch_timeout_is_transient() {
        let err = FsError::FetchTimeout {
            path: PathBuf::from("/movie/movie.mkv"),
            pieces: 0..=3,
            waited: Duration::from_secs(1),
        };
        assert!(err.is_transient());
        assert_eq!(err.errno(), libc::ETIMEDOUT);
        assert!(err.to_string().contains("0..=3"));
    }

    #[test]
    fn errno_mapping() {
        let path = PathBuf::from("/x");
        assert_eq!(FsError::NotADirectory { path: path.clone() }.errno(), libc::ENOTDIR);
        assert_eq!(FsError::IsADirectory { path: path.clone() }.errno(), libc::EISDIR);
        assert_eq!(FsError::Interrupted { path }.errno(), libc::EINTR);
        assert_eq!(FsError::InvalidHandle { handle: Handle(3) }.errno(), libc::EBADF);
    }

    #[test]
    fn from_io_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        assert!(matches!(FsError::from(io_err), FsError::NotFound { .. }));
    }

    #[test]
    fn from_io_other_keeps_os_errno() {
        let io_err = std::io::Error::from_raw_os_error(libc::EACCES);
        let err = FsError::from(io_err);
        assert!(matches!(err, FsError::Io { .. }));
        assert_eq!(err.errno(), libc::EACCES);
    }
}
