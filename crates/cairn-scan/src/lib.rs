//! Phase 1 scanning engine for cairn.
//!
//! Walks the configured start directories, classifies every entry and sends
//! the resulting frames to the backup server while filling in the estimate
//! counters.
//!
//! # Overview
//!
//! - [`JwalkWalker`] produces classified [`Entry`] values in sorted,
//!   depth-first order, with hard link detection.
//! - [`Phase1Dispatcher`] turns one entry into an ordered [`Plan`] of frames,
//!   counter updates and warnings.
//! - [`Phase1Scanner`] drives the walk and applies every plan to a
//!   [`Transport`].
//!
//! # Example
//!
//! ```rust,no_run
//! use cairn_scan::{JwalkWalker, Phase1Scanner, ScanConfig, StreamTransport};
//!
//! let config = ScanConfig::new("/srv");
//! let walker = JwalkWalker::from_config(&config);
//! let scanner = Phase1Scanner::new(config);
//! let mut transport = StreamTransport::new(std::io::stdout());
//!
//! let report = scanner.run(&walker, &mut transport).unwrap();
//! println!("{} bytes to back up", report.counters.byte());
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use cairn_scan::{Phase1Scanner, ScanConfig};
//!
//! let scanner = Phase1Scanner::new(ScanConfig::new("/srv"));
//! let mut progress_rx = scanner.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(counters) = progress_rx.recv().await {
//!         println!("{} items so far", counters.total().total());
//!     }
//! });
//! ```

mod dispatcher;
mod encode;
mod extrameta;
mod frame;
mod inode;
mod scanner;
mod transport;
mod walker;

pub use dispatcher::{Action, Phase1Dispatcher, Plan, apply};
pub use encode::{AttributeEncoder, DecodedAttribs, StatEncoder, base64_to_int, int_to_base64};
#[cfg(all(unix, feature = "xattr"))]
pub use extrameta::XattrProvider;
pub use extrameta::{ExtraMetaProvider, META_XATTR, NoExtraMeta, push_xattr_record};
pub use frame::{FRAME_HEADER_LEN, Frame, MAX_FRAME_PAYLOAD, read_frame};
pub use inode::{HardLinkTracker, InodeKey};
pub use scanner::{Phase1Scanner, ScanReport};
pub use transport::{
    ChannelTransport, FRAME_CHANNEL_SIZE, NullTransport, RecordingTransport, StreamTransport,
    Transport, forward_frames, frame_channel,
};
pub use walker::{JwalkWalker, TreeWalk};

// Re-export core types for convenience
pub use cairn_core::{
    CommandTag, CounterKind, Counters, Entry, EntryKind, RawStat, ScanConfig, ScanError,
    ScanWarning, TagSet, WarningKind,
};
