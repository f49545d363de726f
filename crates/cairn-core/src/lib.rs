//! Core types and configuration for cairn.
//!
//! This crate provides the data structures shared by the phase 1 scanner and
//! the status monitor: classified file system entries, protocol command tags,
//! run counters, the inclusion policy and configuration.

mod command;
mod config;
mod counters;
mod entry;
mod error;
mod policy;

pub use command::{CommandTag, TagSet};
pub use config::{
    BackupConfig, DEFAULT_STATUS_PORT, ScanConfig, ScanConfigBuilder, StartDir, start_dirs_from,
};
pub use counters::{CounterKind, Counters, Disposition, KindCounts};
pub use entry::{Entry, EntryKind, FILE_ATTRIBUTE_ENCRYPTED, RawStat};
pub use error::{ScanError, ScanWarning, WarningKind};
pub use policy::{Compression, CompressionRule, DirRule, InclusionPolicy};
