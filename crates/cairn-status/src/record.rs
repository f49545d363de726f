//! One client's status line.
//!
//! A record is a tab separated line:
//!
//! ```text
//! <client>\t3\t<run-state>[\t<token>]*
//! ```
//!
//! Every token starts with a one-byte key. Counter tokens reuse the command
//! tag byte of their kind and carry `new/changed/same/deleted/estimated`.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use compact_str::CompactString;
use strum::{Display, EnumIter, IntoEnumIterator};

use cairn_core::{CommandTag, CounterKind, Counters, Disposition};

use crate::error::StatusError;

/// Wire format version carried in the second field.
pub const STATUS_VERSION: &str = "3";

/// Whether a client is doing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum RunState {
    #[strum(to_string = "idle")]
    Idle,
    #[strum(to_string = "running")]
    Running,
    #[strum(to_string = "server crashed")]
    ServerCrashed,
    #[strum(to_string = "client crashed")]
    ClientCrashed,
}

impl RunState {
    pub const fn as_char(self) -> char {
        match self {
            Self::Idle => 'i',
            Self::Running => 'r',
            Self::ServerCrashed => 'C',
            Self::ClientCrashed => 'c',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        Self::iter().find(|s| s.as_char() == c)
    }
}

/// Stage of a running client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Scanning,
    Backup,
    Merging,
    Shuffling,
    Restoring,
    Verifying,
    Listing,
}

impl Phase {
    pub const fn as_char(self) -> char {
        match self {
            Self::Scanning => '1',
            Self::Backup => '2',
            Self::Merging => '3',
            Self::Shuffling => '4',
            Self::Restoring => '5',
            Self::Verifying => '6',
            Self::Listing => '7',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        Self::iter().find(|p| p.as_char() == c)
    }

    /// Restore and verify report attempted against expected items only.
    pub fn is_restore_like(self) -> bool {
        matches!(self, Self::Restoring | Self::Verifying)
    }
}

/// A prior backup of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupInfo {
    pub number: u64,
    /// Completion time, unix seconds.
    pub timestamp: Option<i64>,
}

impl BackupInfo {
    fn parse(value: &str) -> Option<Self> {
        match value.split_once(' ') {
            Some((number, ts)) => Some(Self {
                number: number.parse().ok()?,
                timestamp: Some(ts.parse().ok()?),
            }),
            None => Some(Self {
                number: value.parse().ok()?,
                timestamp: None,
            }),
        }
    }
}

impl fmt::Display for BackupInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timestamp {
            Some(ts) => write!(f, "{} {}", self.number, ts),
            None => write!(f, "{}", self.number),
        }
    }
}

/// Decoded status of one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub client: CompactString,
    pub run_state: RunState,
    pub phase: Option<Phase>,
    /// Path currently being worked on.
    pub path: Option<String>,
    /// Prior backups, newest first.
    pub backups: Vec<BackupInfo>,
    /// Phase 1 estimate counters.
    pub estimate: Counters,
    /// Transfer progress counters.
    pub progress: Counters,
}

impl StatusRecord {
    pub fn new(client: impl Into<CompactString>, run_state: RunState) -> Self {
        Self {
            client: client.into(),
            run_state,
            phase: None,
            path: None,
            backups: Vec::new(),
            estimate: Counters::new(),
            progress: Counters::new(),
        }
    }

    /// Decode one line, without its trailing newline.
    pub fn decode_line(line: &str) -> Result<Self, StatusError> {
        let mut fields = line.split('\t');

        let client = fields
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| StatusError::malformed(line, "missing client name"))?;
        match fields.next() {
            Some(STATUS_VERSION) => {}
            Some(other) => {
                return Err(StatusError::malformed(
                    line,
                    format!("unsupported version {other:?}"),
                ));
            }
            None => return Err(StatusError::malformed(line, "missing version")),
        }
        let run_state = fields
            .next()
            .and_then(single_char)
            .and_then(RunState::from_char)
            .ok_or_else(|| StatusError::malformed(line, "bad run state"))?;

        let mut record = Self::new(client, run_state);
        let mut seen = HashSet::new();
        for token in fields {
            // Only prior backups may repeat.
            if let Some(key) = token.chars().next().filter(|k| *k != 'H') {
                if !seen.insert(key) {
                    return Err(StatusError::malformed(line, format!("repeated field {key:?}")));
                }
            }
            record.apply_token(line, token)?;
        }
        Ok(record)
    }

    fn apply_token(&mut self, line: &str, token: &str) -> Result<(), StatusError> {
        let mut chars = token.chars();
        let key = chars
            .next()
            .ok_or_else(|| StatusError::malformed(line, "empty field"))?;
        let value = chars.as_str();
        let number = |what: &str| {
            value
                .parse::<u64>()
                .map_err(|_| StatusError::malformed(line, format!("bad {what} {value:?}")))
        };

        match key {
            'P' => {
                let phase = single_char(value)
                    .and_then(Phase::from_char)
                    .ok_or_else(|| StatusError::malformed(line, format!("bad phase {value:?}")))?;
                self.phase = Some(phase);
            }
            'p' => self.path = Some(value.to_string()),
            'H' => {
                let backup = BackupInfo::parse(value)
                    .ok_or_else(|| StatusError::malformed(line, format!("bad backup {value:?}")))?;
                self.backups.push(backup);
            }
            'w' => self.progress.add_warnings(number("warning count")?),
            'B' => self.estimate.increment_bytes(number("byte count")?),
            'b' => self.progress.increment_bytes(number("byte count")?),
            'r' => self.progress.increment_recv_bytes(number("byte count")?),
            'S' => self.progress.increment_sent_bytes(number("byte count")?),
            'T' => {
                let start = value.parse::<i64>().map_err(|_| {
                    StatusError::malformed(line, format!("bad start time {value:?}"))
                })?;
                self.estimate.mark_started(start);
            }
            other => {
                let kind = u8::try_from(other)
                    .ok()
                    .and_then(CommandTag::from_byte)
                    .and_then(CounterKind::for_tag)
                    .ok_or_else(|| {
                        StatusError::malformed(line, format!("unknown field {other:?}"))
                    })?;
                self.apply_counts(line, kind, value)?;
            }
        }
        Ok(())
    }

    fn apply_counts(
        &mut self,
        line: &str,
        kind: CounterKind,
        value: &str,
    ) -> Result<(), StatusError> {
        let counts = value
            .split('/')
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| StatusError::malformed(line, format!("bad {kind} counts {value:?}")))?;
        let [new, changed, same, deleted, estimated] = counts[..] else {
            return Err(StatusError::malformed(
                line,
                format!("expected 5 {kind} counts, got {}", counts.len()),
            ));
        };
        if new.checked_add(changed).and_then(|n| n.checked_add(same)).is_none() {
            return Err(StatusError::malformed(line, format!("{kind} counts overflow")));
        }
        self.progress.increment_as(kind, Disposition::New, new);
        self.progress.increment_as(kind, Disposition::Changed, changed);
        self.progress.increment_as(kind, Disposition::Same, same);
        self.progress.increment_as(kind, Disposition::Deleted, deleted);
        self.estimate.increment(kind, estimated);
        Ok(())
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

impl FromStr for StatusRecord {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode_line(s)
    }
}

impl fmt::Display for StatusRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.client, STATUS_VERSION, self.run_state.as_char())?;
        if let Some(phase) = self.phase {
            write!(f, "\tP{}", phase.as_char())?;
        }
        if let Some(path) = &self.path {
            write!(f, "\tp{path}")?;
        }
        for backup in &self.backups {
            write!(f, "\tH{backup}")?;
        }
        for (kind, counts) in self.progress.iter() {
            let estimated = self.estimate.get(kind).total();
            if counts.is_empty() && estimated == 0 {
                continue;
            }
            write!(
                f,
                "\t{}{}/{}/{}/{}/{}",
                kind.tag().as_byte() as char,
                counts.new,
                counts.changed,
                counts.same,
                counts.deleted,
                estimated
            )?;
        }
        let numbers = [
            ('w', self.progress.warning()),
            ('B', self.estimate.byte()),
            ('b', self.progress.byte()),
            ('r', self.progress.recv_byte()),
            ('S', self.progress.sent_byte()),
        ];
        for (key, value) in numbers.into_iter().filter(|(_, v)| *v > 0) {
            write!(f, "\t{key}{value}")?;
        }
        if let Some(start) = self.estimate.start() {
            write!(f, "\tT{start}")?;
        }
        Ok(())
    }
}
