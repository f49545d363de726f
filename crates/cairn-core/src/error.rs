//! Error types for scanning operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::CommandTag;

/// Errors that abort a scan.
///
/// Per-entry problems never surface here; they become [`ScanWarning`]s.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Writing a frame to the server failed.
    #[error("Failed to write {tag} frame for {path}: {source}")]
    Transport {
        tag: CommandTag,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A configured regular expression does not compile.
    #[error("Invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Configuration file could not be parsed.
    #[error("Failed to parse {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if this error came from the server channel.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Entry could not be accessed.
    NoAccess,
    /// Link could not be followed.
    NoFollow,
    /// Entry could not be stat'ed.
    NoStat,
    /// Entry skipped because it has not changed.
    NoChange,
    /// Entry skipped because it is the archive itself.
    IsArchive,
    /// Directory could not be opened.
    NoOpenDir,
    /// Walker returned a type it does not know.
    UnknownType,
    /// Filesystem boundary crossed (when not allowed).
    CrossFilesystem,
    /// Entry on an encrypting file system has an unsupported type.
    EfsUnsupported,
}

/// Non-fatal warning encountered during scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: String,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<String>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a file system boundary warning.
    pub fn cross_filesystem(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            message: format!("Dir: {path} [will not descend: file system change not allowed]"),
            path,
            kind: WarningKind::CrossFilesystem,
        }
    }
}
