//! Per-run item and byte counters.
//!
//! A backup run keeps two instances of [`Counters`]: the estimate counters
//! filled in by the phase 1 scan, and the progress counters filled in while
//! content is transferred. Both only ever grow during a run.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, IntoEnumIterator};

use crate::command::CommandTag;

/// Kind of item tracked by the counters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount, Serialize, Deserialize,
)]
pub enum CounterKind {
    #[strum(to_string = "Files")]
    File,
    #[strum(to_string = "Encrypted files")]
    EncFile,
    #[strum(to_string = "Meta data")]
    Meta,
    #[strum(to_string = "Encrypted meta data")]
    EncMeta,
    #[strum(to_string = "Directories")]
    Dir,
    #[strum(to_string = "Soft links")]
    SoftLink,
    #[strum(to_string = "Hard links")]
    HardLink,
    #[strum(to_string = "Special files")]
    Special,
    #[strum(to_string = "EFS files")]
    EfsFile,
}

impl CounterKind {
    /// Counter that a frame with the given tag accounts to.
    pub const fn for_tag(tag: CommandTag) -> Option<Self> {
        match tag {
            CommandTag::Attribs => None,
            CommandTag::File => Some(Self::File),
            CommandTag::EncFile => Some(Self::EncFile),
            CommandTag::Metadata => Some(Self::Meta),
            CommandTag::EncMetadata => Some(Self::EncMeta),
            CommandTag::HardLink => Some(Self::HardLink),
            CommandTag::SoftLink => Some(Self::SoftLink),
            CommandTag::Directory => Some(Self::Dir),
            CommandTag::Special => Some(Self::Special),
            CommandTag::EfsFile => Some(Self::EfsFile),
        }
    }

    /// Command tag sharing this counter's wire byte.
    pub const fn tag(self) -> CommandTag {
        match self {
            Self::File => CommandTag::File,
            Self::EncFile => CommandTag::EncFile,
            Self::Meta => CommandTag::Metadata,
            Self::EncMeta => CommandTag::EncMetadata,
            Self::Dir => CommandTag::Directory,
            Self::SoftLink => CommandTag::SoftLink,
            Self::HardLink => CommandTag::HardLink,
            Self::Special => CommandTag::Special,
            Self::EfsFile => CommandTag::EfsFile,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// What happened to an item relative to the previous backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    New,
    Changed,
    Same,
    Deleted,
}

/// Counts for one item kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub new: u64,
    pub changed: u64,
    pub same: u64,
    pub deleted: u64,
}

impl KindCounts {
    /// New + changed + same, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.new.saturating_add(self.changed).saturating_add(self.same)
    }

    /// Check if every slot is zero.
    pub fn is_empty(&self) -> bool {
        self.total() == 0 && self.deleted == 0
    }

    fn slot(&mut self, disposition: Disposition) -> &mut u64 {
        match disposition {
            Disposition::New => &mut self.new,
            Disposition::Changed => &mut self.changed,
            Disposition::Same => &mut self.same,
            Disposition::Deleted => &mut self.deleted,
        }
    }
}

/// Monotonic counters for one backup run.
///
/// Every increment saturates at `u64::MAX` instead of wrapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    counts: [KindCounts; CounterKind::COUNT],
    byte: u64,
    recv_byte: u64,
    sent_byte: u64,
    warning: u64,
    start: Option<i64>,
}

impl Counters {
    /// Create empty counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create empty counters with the start time set.
    pub fn started_at(start: i64) -> Self {
        Self {
            start: Some(start),
            ..Self::default()
        }
    }

    /// Count `amount` new items of `kind`.
    pub fn increment(&mut self, kind: CounterKind, amount: u64) {
        self.increment_as(kind, Disposition::New, amount);
    }

    /// Count `amount` items of `kind` with the given disposition.
    pub fn increment_as(&mut self, kind: CounterKind, disposition: Disposition, amount: u64) {
        let slot = self.counts[kind.index()].slot(disposition);
        *slot = slot.saturating_add(amount);
    }

    /// Add to the byte total.
    pub fn increment_bytes(&mut self, amount: u64) {
        self.byte = self.byte.saturating_add(amount);
    }

    /// Add to the received byte total.
    pub fn increment_recv_bytes(&mut self, amount: u64) {
        self.recv_byte = self.recv_byte.saturating_add(amount);
    }

    /// Add to the sent byte total.
    pub fn increment_sent_bytes(&mut self, amount: u64) {
        self.sent_byte = self.sent_byte.saturating_add(amount);
    }

    /// Count one warning.
    pub fn add_warning(&mut self) {
        self.add_warnings(1);
    }

    /// Count several warnings.
    pub fn add_warnings(&mut self, amount: u64) {
        self.warning = self.warning.saturating_add(amount);
    }

    /// Record the start time. Only the first call has an effect.
    pub fn mark_started(&mut self, start: i64) {
        self.start.get_or_insert(start);
    }

    /// Counts for one kind.
    pub fn get(&self, kind: CounterKind) -> KindCounts {
        self.counts[kind.index()]
    }

    /// Counts summed over every kind.
    pub fn total(&self) -> KindCounts {
        self.counts
            .iter()
            .fold(KindCounts::default(), |acc, c| KindCounts {
                new: acc.new.saturating_add(c.new),
                changed: acc.changed.saturating_add(c.changed),
                same: acc.same.saturating_add(c.same),
                deleted: acc.deleted.saturating_add(c.deleted),
            })
    }

    /// Iterate over kinds with their counts, in display order.
    pub fn iter(&self) -> impl Iterator<Item = (CounterKind, KindCounts)> + '_ {
        CounterKind::iter().map(|kind| (kind, self.get(kind)))
    }

    pub fn byte(&self) -> u64 {
        self.byte
    }

    pub fn recv_byte(&self) -> u64 {
        self.recv_byte
    }

    pub fn sent_byte(&self) -> u64 {
        self.sent_byte
    }

    pub fn warning(&self) -> u64 {
        self.warning
    }

    pub fn start(&self) -> Option<i64> {
        self.start
    }

    /// Seconds elapsed between the start time and `now`, if started.
    pub fn elapsed_secs(&self, now: i64) -> Option<i64> {
        self.start.map(|start| now.saturating_sub(start))
    }
}
