//! Core types shared by the projection layers.

use std::time::SystemTime;

/// File type bits of `st_mode`.
pub const S_IFMT: u32 = 0o170000;
/// Directory file type.
pub const S_IFDIR: u32 = 0o040000;
/// Regular file type.
pub const S_IFREG: u32 = 0o100000;

/// Mode presented for descriptors and synthesized directories (`dr-xr-xr-x`).
pub const DIR_MODE: u32 = S_IFDIR | 0o555;

/// Type of a projected entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link (real entries only).
    Symlink,
    /// Anything else found in the backing tree (fifo, socket, device).
    Other,
}

impl FileKind {
    /// Derive the kind from a raw `st_mode`.
    pub const fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFDIR => FileKind::Directory,
            S_IFREG => FileKind::File,
            0o120000 => FileKind::Symlink,
            _ => FileKind::Other,
        }
    }
}

/// Stat-equivalent attributes for any projected path.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatInfo {
    /// Raw `st_mode`, file type bits included.
    pub mode: u32,
    /// Size in bytes.
    pub size: u64,
    /// Number of hard links.
    pub nlink: u64,
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Last access time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub atime: SystemTime,
    /// Last modification time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub mtime: SystemTime,
    /// Last status change time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub ctime: SystemTime,
}

impl Default for StatInfo {
    fn default() -> Self {
        Self {
            mode: 0,
            size: 0,
            nlink: 1,
            uid: 0,
            gid: 0,
            atime: SystemTime::UNIX_EPOCH,
            mtime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
        }
    }
}

impl StatInfo {
    /// Kind encoded in [`mode`](Self::mode).
    #[inline]
    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    /// Returns `true` if this is a directory.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    /// Returns `true` if this is a regular file.
    #[inline]
    pub fn is_file(&self) -> bool {
        self.kind() == FileKind::File
    }

    /// Permission bits without the file type.
    #[inline]
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// Filesystem statistics (like `statvfs`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FsStatInfo {
    /// Total size in bytes.
    pub total_bytes: u64,
    /// Free bytes (including reserved blocks).
    pub free_bytes: u64,
    /// Bytes available to unprivileged users.
    pub available_bytes: u64,
    /// Total number of inodes.
    pub total_inodes: u64,
    /// Number of free inodes.
    pub free_inodes: u64,
    /// Block size in bytes.
    pub block_size: u64,
    /// Fragment size in bytes.
    pub fragment_size: u64,
    /// Maximum filename length.
    pub max_name_len: u64,
}

/// A directory entry returned from `read_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirEntry {
    /// Name of the entry, descriptor suffix already stripped.
    pub name: String,
    /// Type of the entry as it is presented.
    pub kind: FileKind,
}

impl DirEntry {
    pub(crate) fn new(name: impl Into<String>, kind: FileKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Opaque file handle returned by `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Handle(pub u64);

/// Fetch priority of a file or piece.
///
/// Levels follow the usual 0..=7 piece priority scale of torrent engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Priority {
    /// Do not download.
    Skip = 0,
    /// Below normal.
    Low = 1,
    /// Engine default.
    #[default]
    Normal = 4,
    /// Fetch before anything else.
    High = 7,
}

impl Priority {
    /// Numeric level on the 0..=7 scale.
    #[inline]
    pub const fn level(self) -> u8 {
        self as u8
    }

    /// Closest priority for a raw level.
    pub const fn from_level(level: u8) -> Self {
        match level {
            0 => Priority::Skip,
            1..=3 => Priority::Low,
            4..=6 => Priority::Normal,
            _ => Priority::High,
        }
    }
}

/// Serde support for SystemTime (when serde feature is enabled).
#[cfg(feature = "serde")]
mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        (duration.as_secs(), duration.subsec_nanos()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (secs, nanos): (u64, u32) = Deserialize::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::new(secs, nanos))
    }
}
