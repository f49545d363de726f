//! Protocol command tags.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// One-byte marker that prefixes every frame on the phase 1 stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
pub enum CommandTag {
    /// Serialized attribute record.
    Attribs,
    /// Plain file.
    File,
    /// File stored with client-side encryption.
    EncFile,
    /// Extended metadata (ACLs, xattrs).
    Metadata,
    /// Extended metadata stored with client-side encryption.
    EncMetadata,
    /// Hard link: path frame followed by target frame.
    HardLink,
    /// Symbolic link: path frame followed by target frame.
    SoftLink,
    /// Directory.
    Directory,
    /// Fifo, socket or device node.
    Special,
    /// File on an encrypting file system, passed through raw.
    EfsFile,
}

impl CommandTag {
    /// Wire byte for this tag.
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Attribs => b'r',
            Self::File => b'f',
            Self::EncFile => b'y',
            Self::Metadata => b'm',
            Self::EncMetadata => b'n',
            Self::HardLink => b'L',
            Self::SoftLink => b'l',
            Self::Directory => b'd',
            Self::Special => b's',
            Self::EfsFile => b'k',
        }
    }

    /// Parse a wire byte back into a tag.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'r' => Some(Self::Attribs),
            b'f' => Some(Self::File),
            b'y' => Some(Self::EncFile),
            b'm' => Some(Self::Metadata),
            b'n' => Some(Self::EncMetadata),
            b'L' => Some(Self::HardLink),
            b'l' => Some(Self::SoftLink),
            b'd' => Some(Self::Directory),
            b's' => Some(Self::Special),
            b'k' => Some(Self::EfsFile),
            _ => None,
        }
    }

    /// Whether this tag carries file or metadata content subject to run-level encryption.
    pub const fn is_encrypted(self) -> bool {
        matches!(self, Self::EncFile | Self::EncMetadata)
    }
}

/// File and metadata tags chosen once per scan.
///
/// Encrypted runs swap both tags for their encrypted counterparts. The
/// selection lives on the scanning instance so concurrent scans never share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSet {
    /// Tag used for regular file entries.
    pub file: CommandTag,
    /// Tag used for extrameta entries.
    pub metadata: CommandTag,
}

impl TagSet {
    /// Plain file and metadata tags.
    pub const PLAIN: Self = Self {
        file: CommandTag::File,
        metadata: CommandTag::Metadata,
    };

    /// Encrypted file and metadata tags.
    pub const ENCRYPTED: Self = Self {
        file: CommandTag::EncFile,
        metadata: CommandTag::EncMetadata,
    };

    /// Select the tag set for a run.
    pub const fn for_encryption(encrypted: bool) -> Self {
        if encrypted { Self::ENCRYPTED } else { Self::PLAIN }
    }
}

impl Default for TagSet {
    fn default() -> Self {
        Self::PLAIN
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_wire_bytes_are_distinct() {
        let bytes: HashSet<u8> = CommandTag::iter().map(CommandTag::as_byte).collect();
        assert_eq!(bytes.len(), CommandTag::iter().count());
    }

    #[test]
    fn test_from_byte_inverts_as_byte() {
        for tag in CommandTag::iter() {
            assert_eq!(CommandTag::from_byte(tag.as_byte()), Some(tag));
        }
        assert_eq!(CommandTag::from_byte(b'?'), None);
    }

    #[test]
    fn test_tag_set_selection() {
        assert_eq!(TagSet::for_encryption(false), TagSet::PLAIN);
        let enc = TagSet::for_encryption(true);
        assert!(enc.file.is_encrypted());
        assert!(enc.metadata.is_encrypted());
    }
}
