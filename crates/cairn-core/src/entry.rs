//! File system entries as produced by a tree walk.

use serde::{Deserialize, Serialize};

/// Windows `FILE_ATTRIBUTE_ENCRYPTED` bit.
pub const FILE_ATTRIBUTE_ENCRYPTED: u64 = 0x4000;

/// Classification assigned to an entry by the tree walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Hard link to a file already emitted earlier in the walk.
    HardLinkSaved,
    /// Plain regular file.
    Regular,
    /// Regular file read through a platform backup API.
    RegularExtended,
    /// Block device read as file content.
    Raw,
    /// Fifo read as file content.
    Fifo,
    /// Symbolic link.
    SymLink,
    /// Start of a directory.
    DirBegin,
    /// End of a directory.
    DirEnd,
    /// Directory not descended because it is on another file system.
    DirNoFsChange,
    /// Reparse point.
    Reparse,
    /// Directory junction.
    Junction,
    /// Fifo, socket or device node.
    Special,
    /// Entry could not be accessed.
    NoAccess,
    /// Link could not be followed.
    NoFollow,
    /// Entry could not be stat'ed.
    NoStat,
    /// Entry unchanged since the last backup.
    NoChange,
    /// Entry is the archive being written.
    IsArchive,
    /// Directory could not be opened.
    NoOpenDir,
    /// Type code the walker did not recognise.
    Unknown(u8),
}

impl EntryKind {
    /// Check if this is one of the file-content variants.
    pub fn is_file_like(&self) -> bool {
        matches!(
            self,
            EntryKind::Regular | EntryKind::RegularExtended | EntryKind::Raw | EntryKind::Fifo
        )
    }

    /// Check if this opens a directory.
    pub fn is_dir_begin(&self) -> bool {
        matches!(
            self,
            EntryKind::DirBegin | EntryKind::Reparse | EntryKind::Junction
        )
    }
}

/// Raw stat attributes of an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl RawStat {
    /// Build from file system metadata.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
            mode: metadata.mode(),
            nlink: metadata.nlink(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            rdev: metadata.rdev(),
            size: metadata.size(),
            blksize: metadata.blksize(),
            blocks: metadata.blocks(),
            atime: metadata.atime(),
            mtime: metadata.mtime(),
            ctime: metadata.ctime(),
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let secs = |t: std::io::Result<std::time::SystemTime>| {
            t.ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        };
        Self {
            nlink: 1,
            size: metadata.len(),
            blocks: metadata.len().div_ceil(512),
            atime: secs(metadata.accessed()),
            mtime: secs(metadata.modified()),
            ctime: secs(metadata.created()),
            ..Self::default()
        }
    }
}

/// One file system object observed during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Full path of the entry.
    pub path: String,
    /// Link target, for symbolic and saved hard links.
    pub link_target: Option<String>,
    /// Dispatch classification.
    pub kind: EntryKind,
    /// Raw stat data.
    pub stat: RawStat,
    /// Platform attribute bits (Windows file attributes, zero elsewhere).
    pub platform_attrs: u64,
    /// True for a configured start directory itself.
    pub top_level: bool,
    /// System error text for error classifications.
    pub os_error: Option<String>,
}

impl Entry {
    /// Create an entry with default stat data.
    pub fn new(path: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            path: path.into(),
            link_target: None,
            kind,
            stat: RawStat::default(),
            platform_attrs: 0,
            top_level: false,
            os_error: None,
        }
    }

    /// Create an error entry carrying the system error text.
    pub fn error(path: impl Into<String>, kind: EntryKind, error: &std::io::Error) -> Self {
        Self {
            os_error: Some(error.to_string()),
            ..Self::new(path, kind)
        }
    }

    pub fn with_stat(mut self, stat: RawStat) -> Self {
        self.stat = stat;
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.stat.size = size;
        self
    }

    pub fn with_link_target(mut self, target: impl Into<String>) -> Self {
        self.link_target = Some(target.into());
        self
    }

    pub fn with_platform_attrs(mut self, attrs: u64) -> Self {
        self.platform_attrs = attrs;
        self
    }

    pub fn with_top_level(mut self, top_level: bool) -> Self {
        self.top_level = top_level;
        self
    }

    /// Size in bytes; meaningful for plain regular files only.
    pub fn size(&self) -> u64 {
        self.stat.size
    }

    /// Check if the platform flags the entry as file-system encrypted.
    pub fn is_fs_encrypted(&self) -> bool {
        self.platform_attrs & FILE_ATTRIBUTE_ENCRYPTED != 0
    }

    /// System error text, or an empty string.
    pub fn error_text(&self) -> &str {
        self.os_error.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_groups() {
        assert!(EntryKind::Fifo.is_file_like());
        assert!(!EntryKind::Special.is_file_like());
        assert!(EntryKind::Junction.is_dir_begin());
        assert!(!EntryKind::DirNoFsChange.is_dir_begin());
    }

    #[test]
    fn test_entry_builders() {
        let entry = Entry::new("/a/b", EntryKind::SymLink)
            .with_link_target("c")
            .with_size(10)
            .with_platform_attrs(FILE_ATTRIBUTE_ENCRYPTED);
        assert_eq!(entry.link_target.as_deref(), Some("c"));
        assert_eq!(entry.size(), 10);
        assert!(entry.is_fs_encrypted());
        assert_eq!(entry.error_text(), "");
    }
}
