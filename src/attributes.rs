//! # Attribute Synthesizer
//!
//! Stat-equivalent metadata for every resolution kind. Package paths borrow
//! the descriptor file's attributes as a base, so ownership and timestamps
//! follow the descriptor, and override only what the projection changes:
//! the mode for directories, the size for files.

use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::projector::{Classification, NamespaceProjector};
use crate::registry::SourceRegistry;
use crate::resolver::Resolution;
use crate::source::ContentEntry;
use crate::types::{DIR_MODE, S_IFREG};
use crate::{FsError, StatInfo};

fn timestamp(secs: i64, nanos: i64) -> SystemTime {
    let nanos = nanos.clamp(0, 999_999_999) as u32;
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + Duration::from_nanos(nanos as u64)
    }
}

/// Attributes of a real path, symlinks not followed.
pub fn stat_path(path: &Path) -> Result<StatInfo, FsError> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| FsError::io("stat", path, e))?;
    Ok(StatInfo {
        mode: meta.mode(),
        size: meta.size(),
        nlink: meta.nlink(),
        uid: meta.uid(),
        gid: meta.gid(),
        atime: timestamp(meta.atime(), meta.atime_nsec()),
        mtime: timestamp(meta.mtime(), meta.mtime_nsec()),
        ctime: timestamp(meta.ctime(), meta.ctime_nsec()),
    })
}

/// Present descriptor attributes as a traversable directory.
fn as_directory(base: StatInfo) -> StatInfo {
    StatInfo {
        mode: DIR_MODE,
        ..base
    }
}

/// Present descriptor attributes as the read-only file `entry`.
fn as_entry(base: StatInfo, entry: &ContentEntry) -> StatInfo {
    StatInfo {
        mode: S_IFREG | (base.permissions() & 0o555),
        size: entry.size(),
        ..base
    }
}

/// Computes [`StatInfo`] for resolved paths.
pub struct AttributeSynthesizer {
    registry: Arc<SourceRegistry>,
}

impl AttributeSynthesizer {
    /// Create a synthesizer acquiring sources from `registry`.
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self { registry }
    }

    /// Attributes for `resolution`.
    ///
    /// A package path that names no entry and no synthesized directory falls
    /// back to a real entry under the content root, if one exists.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if neither the package nor the real tree has it
    /// - [`FsError::BadDescriptor`] if the descriptor cannot be parsed
    pub fn attributes(&self, resolution: &Resolution) -> Result<StatInfo, FsError> {
        match resolution {
            Resolution::RealFile { path } | Resolution::RealDirectory { path } => stat_path(path),
            Resolution::Descriptor { descriptor, .. } => Ok(as_directory(stat_path(descriptor)?)),
            Resolution::Content {
                descriptor,
                sub_path,
                ..
            } => {
                let source = self.registry.acquire(descriptor)?;
                match NamespaceProjector::new(&source).classify(sub_path) {
                    Classification::File(entry) => Ok(as_entry(stat_path(descriptor)?, entry)),
                    Classification::Directory => Ok(as_directory(stat_path(descriptor)?)),
                    Classification::None => stat_path(&resolution.real_path()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FetchMode, MemoryEngine, MemoryPackage};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn setup() -> (tempfile::TempDir, AttributeSynthesizer) {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MemoryEngine::new(FetchMode::Seeded));
        engine.register(
            b"movie".to_vec(),
            MemoryPackage::new("MovieRelease", 16_384)
                .with_sparse_file("MovieRelease/movie.mkv", 1_000_000_000)
                .with_file("MovieRelease/extras/notes.txt", b"notes".to_vec()),
        );
        let descriptor = dir.path().join("movie.torrent");
        fs::write(&descriptor, b"movie").unwrap();
        fs::set_permissions(&descriptor, fs::Permissions::from_mode(0o640)).unwrap();
        let registry = SourceRegistry::new(engine, true);
        (dir, AttributeSynthesizer::new(registry))
    }

    fn content(dir: &tempfile::TempDir, sub_path: &str) -> Resolution {
        Resolution::Content {
            descriptor: dir.path().join("movie.torrent"),
            content_root: dir.path().join("movie"),
            sub_path: sub_path.into(),
        }
    }

    #[test]
    fn descriptor_presents_as_directory() {
        let (dir, attrs) = setup();
        let stat = attrs
            .attributes(&Resolution::Descriptor {
                descriptor: dir.path().join("movie.torrent"),
                content_root: dir.path().join("movie"),
            })
            .unwrap();
        let real = stat_path(&dir.path().join("movie.torrent")).unwrap();

        assert!(stat.is_dir());
        assert_eq!(stat.mode, DIR_MODE);
        assert_eq!(stat.uid, real.uid);
        assert_eq!(stat.mtime, real.mtime);
    }

    #[test]
    fn entry_takes_declared_size() {
        let (dir, attrs) = setup();
        let stat = attrs.attributes(&content(&dir, "/movie.mkv")).unwrap();
        assert!(stat.is_file());
        assert_eq!(stat.size, 1_000_000_000);
        assert_eq!(stat.permissions(), 0o440);
    }

    #[test]
    fn synthesized_directory() {
        let (dir, attrs) = setup();
        let stat = attrs.attributes(&content(&dir, "/extras")).unwrap();
        assert!(stat.is_dir());
    }

    #[test]
    fn unknown_entry_falls_back_to_real_tree() {
        let (dir, attrs) = setup();
        let err = attrs.attributes(&content(&dir, "/missing.mkv")).unwrap_err();
        assert!(matches!(err, FsError::NotFound { .. }));

        fs::create_dir(dir.path().join("movie")).unwrap();
        fs::write(dir.path().join("movie/local.nfo"), b"12345678").unwrap();
        let stat = attrs.attributes(&content(&dir, "/local.nfo")).unwrap();
        assert_eq!(stat.size, 8);
    }

    #[test]
    fn real_file_passes_through() {
        let (dir, attrs) = setup();
        let path = dir.path().join("plain.txt");
        fs::write(&path, b"abc").unwrap();
        let meta = fs::symlink_metadata(&path).unwrap();

        let stat = attrs.attributes(&Resolution::RealFile { path }).unwrap();
        assert_eq!(stat.size, 3);
        assert_eq!(stat.mode, meta.mode());
        assert_eq!(stat.mtime, meta.modified().unwrap());
    }

    #[test]
    fn negative_timestamps() {
        assert_eq!(timestamp(-1, 0), UNIX_EPOCH - Duration::from_secs(1));
        assert_eq!(timestamp(1, 5), UNIX_EPOCH + Duration::new(1, 5));
    }
}
