//! Per-entry dispatch: classification to frames and counter updates.
//!
//! Dispatch happens in two steps. [`Phase1Dispatcher::plan`] turns an entry
//! into an ordered list of [`Action`]s without side effects, and
//! [`Phase1Dispatcher::dispatch`] applies that list to a transport and the
//! estimate counters in order.

use cairn_core::{
    CommandTag, CounterKind, Counters, Entry, EntryKind, ScanConfig, ScanError, ScanWarning, TagSet,
    WarningKind,
};

use crate::encode::{AttributeEncoder, StatEncoder};
use crate::extrameta::{ExtraMetaProvider, NoExtraMeta};
use crate::frame::Frame;
use crate::transport::Transport;

/// One side effect of dispatching an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write a frame to the server.
    Send(Frame),
    /// Count one new item of a kind.
    Count(CounterKind),
    /// Add to the estimated byte total.
    Bytes(u64),
    /// Report a per-entry problem.
    Warn(ScanWarning),
}

/// Ordered actions for one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    actions: Vec<Action>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    fn send(&mut self, tag: CommandTag, payload: impl Into<String>) {
        self.actions.push(Action::Send(Frame::new(tag, payload)));
    }

    fn count(&mut self, kind: CounterKind) {
        self.actions.push(Action::Count(kind));
    }

    fn bytes(&mut self, amount: u64) {
        self.actions.push(Action::Bytes(amount));
    }

    fn warn(&mut self, warning: ScanWarning) {
        self.actions.push(Action::Warn(warning));
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Frames in emission order.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.actions.iter().filter_map(|action| match action {
            Action::Send(frame) => Some(frame),
            _ => None,
        })
    }

    /// Warnings raised by the entry.
    pub fn warnings(&self) -> impl Iterator<Item = &ScanWarning> {
        self.actions.iter().filter_map(|action| match action {
            Action::Warn(warning) => Some(warning),
            _ => None,
        })
    }
}

impl IntoIterator for Plan {
    type Item = Action;
    type IntoIter = std::vec::IntoIter<Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}

/// Turns walker entries into protocol frames for one scan.
///
/// The file and metadata tags are chosen once, when the dispatcher is built,
/// from the run's encryption setting.
#[derive(Debug)]
pub struct Phase1Dispatcher<E = StatEncoder, M = NoExtraMeta> {
    config: ScanConfig,
    tags: TagSet,
    file_kind: CounterKind,
    meta_kind: CounterKind,
    encoder: E,
    extrameta: M,
}

impl Phase1Dispatcher {
    /// Dispatcher with the default encoder and no extended metadata.
    pub fn new(config: ScanConfig) -> Self {
        Self::with_parts(config, StatEncoder, NoExtraMeta)
    }
}

impl<E: AttributeEncoder, M: ExtraMetaProvider> Phase1Dispatcher<E, M> {
    pub fn with_parts(config: ScanConfig, encoder: E, extrameta: M) -> Self {
        let tags = TagSet::for_encryption(config.encrypted);
        let (file_kind, meta_kind) = if config.encrypted {
            (CounterKind::EncFile, CounterKind::EncMeta)
        } else {
            (CounterKind::File, CounterKind::Meta)
        };
        Self {
            config,
            tags,
            file_kind,
            meta_kind,
            encoder,
            extrameta,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn tags(&self) -> TagSet {
        self.tags
    }

    /// Work out the frames, counter updates and warnings for one entry.
    pub fn plan(&self, entry: &Entry) -> Plan {
        let mut plan = Plan::new();
        if !self.config.policy.is_included(&entry.path, entry.top_level) {
            return plan;
        }
        if self.config.efs_passthrough && entry.is_fs_encrypted() {
            self.plan_efs(entry, &mut plan);
            return plan;
        }

        let path = entry.path.as_str();
        match entry.kind {
            EntryKind::HardLinkSaved => self.plan_link(entry, CommandTag::HardLink, &mut plan),
            EntryKind::SymLink => self.plan_link(entry, CommandTag::SoftLink, &mut plan),
            EntryKind::DirEnd => {}
            EntryKind::DirNoFsChange => plan.warn(ScanWarning::cross_filesystem(path)),
            kind if kind.is_file_like() => {
                let compression = self
                    .config
                    .policy
                    .compression_for(path, self.config.compression);
                let attribs = self.encoder.encode(entry, compression);
                plan.send(CommandTag::Attribs, attribs.as_str());
                plan.send(self.tags.file, path);
                plan.count(self.file_kind);
                if entry.kind == EntryKind::Regular {
                    plan.bytes(entry.size());
                }
                self.plan_extrameta(path, self.tags.file, &attribs, &mut plan);
            }
            kind if kind.is_dir_begin() => {
                let attribs = self.encoder.encode(entry, self.config.compression);
                plan.send(CommandTag::Attribs, attribs.as_str());
                if self.config.directory_as_file {
                    plan.send(self.tags.file, path);
                    plan.count(self.file_kind);
                } else {
                    plan.send(CommandTag::Directory, path);
                    plan.count(CounterKind::Dir);
                    self.plan_extrameta(path, CommandTag::Directory, &attribs, &mut plan);
                }
            }
            EntryKind::Special => {
                let attribs = self.encoder.encode(entry, self.config.compression);
                plan.send(CommandTag::Attribs, attribs.as_str());
                plan.send(CommandTag::Special, path);
                plan.count(CounterKind::Special);
                self.plan_extrameta(path, CommandTag::Special, &attribs, &mut plan);
            }
            _ => plan.warn(error_warning(entry)),
        }
        plan
    }

    fn plan_link(&self, entry: &Entry, tag: CommandTag, plan: &mut Plan) {
        let Some(target) = entry.link_target.as_deref() else {
            plan.warn(ScanWarning::new(
                &entry.path,
                format!("Err: Could not follow link {}: no link target", entry.path),
                WarningKind::NoFollow,
            ));
            return;
        };
        let attribs = self.encoder.encode(entry, self.config.compression);
        plan.send(CommandTag::Attribs, attribs.as_str());
        plan.send(tag, entry.path.as_str());
        plan.send(tag, target);
        let kind = if tag == CommandTag::HardLink {
            CounterKind::HardLink
        } else {
            CounterKind::SoftLink
        };
        plan.count(kind);
        self.plan_extrameta(&entry.path, tag, &attribs, plan);
    }

    fn plan_efs(&self, entry: &Entry, plan: &mut Plan) {
        match entry.kind {
            EntryKind::Regular | EntryKind::RegularExtended | EntryKind::DirBegin => {
                let attribs = self.encoder.encode(entry, self.config.compression);
                plan.send(CommandTag::Attribs, attribs);
                plan.send(CommandTag::EfsFile, entry.path.as_str());
                plan.count(CounterKind::EfsFile);
                if entry.kind == EntryKind::Regular {
                    plan.bytes(entry.size());
                }
            }
            EntryKind::DirEnd => {}
            other => plan.warn(ScanWarning::new(
                &entry.path,
                format!("EFS type {other:?} not yet supported: {}", entry.path),
                WarningKind::EfsUnsupported,
            )),
        }
    }

    /// Attribute record and metadata frame when the entry carries extrameta.
    fn plan_extrameta(&self, path: &str, tag: CommandTag, attribs: &str, plan: &mut Plan) {
        if self.extrameta.has_extrameta(path, tag) {
            plan.send(CommandTag::Attribs, attribs);
            plan.send(self.tags.metadata, path);
            plan.count(self.meta_kind);
        }
    }

    /// Plan one entry and apply it.
    ///
    /// Returns the warnings the entry raised. A failed frame write is fatal
    /// and stops the remaining actions; earlier counter updates stay.
    pub fn dispatch<T: Transport>(
        &self,
        entry: &Entry,
        transport: &mut T,
        counters: &mut Counters,
    ) -> Result<Vec<ScanWarning>, ScanError> {
        let plan = self.plan(entry);
        apply(plan, &entry.path, transport, counters)
    }
}

/// Apply a plan in order.
pub fn apply<T: Transport>(
    plan: Plan,
    path: &str,
    transport: &mut T,
    counters: &mut Counters,
) -> Result<Vec<ScanWarning>, ScanError> {
    let mut warnings = Vec::new();
    for action in plan {
        match action {
            Action::Send(frame) => {
                tracing::debug!(target: "cairn::scan", tag = %frame.tag(), "{}", frame.payload());
                transport
                    .write_frame(&frame)
                    .map_err(|source| ScanError::Transport {
                        tag: frame.tag(),
                        path: path.to_string(),
                        source,
                    })?;
            }
            Action::Count(kind) => counters.increment(kind, 1),
            Action::Bytes(amount) => counters.increment_bytes(amount),
            Action::Warn(warning) => {
                tracing::warn!(target: "cairn::scan", "{}", warning.message);
                counters.add_warning();
                warnings.push(warning);
            }
        }
    }
    Ok(warnings)
}

fn error_warning(entry: &Entry) -> ScanWarning {
    let path = entry.path.as_str();
    let err = entry.error_text();
    let (message, kind) = match entry.kind {
        EntryKind::NoAccess => (
            format!("Err: Could not access {path}: {err}"),
            WarningKind::NoAccess,
        ),
        EntryKind::NoFollow => (
            format!("Err: Could not follow link {path}: {err}"),
            WarningKind::NoFollow,
        ),
        EntryKind::NoStat => (
            format!("Err: Could not stat {path}: {err}"),
            WarningKind::NoStat,
        ),
        EntryKind::NoChange => (
            format!("Skip: File not saved. No change. {path}"),
            WarningKind::NoChange,
        ),
        EntryKind::IsArchive => (
            format!("Err: Attempt to backup archive. Not saved. {path}"),
            WarningKind::IsArchive,
        ),
        EntryKind::NoOpenDir => (
            format!("Err: Could not open directory {path}: {err}"),
            WarningKind::NoOpenDir,
        ),
        EntryKind::Unknown(code) => (
            format!("Err: Unknown file type {code}: {path}"),
            WarningKind::UnknownType,
        ),
        other => (
            format!("Err: Unknown file type {other:?}: {path}"),
            WarningKind::UnknownType,
        ),
    };
    ScanWarning::new(path, message, kind)
}

#[cfg(test)]
mod tests {
    use cairn_core::{
        Compression, CompressionRule, DirRule, FILE_ATTRIBUTE_ENCRYPTED, InclusionPolicy,
    };

    use super::*;
    use crate::transport::RecordingTransport;

    fn config() -> ScanConfig {
        ScanConfig::new("/data")
    }

    fn tags_of(plan: &Plan) -> Vec<CommandTag> {
        plan.frames().map(Frame::tag).collect()
    }

    #[test]
    fn test_regular_file_frames() {
        let dispatcher = Phase1Dispatcher::new(config());
        let entry = Entry::new("/data/a.txt", EntryKind::Regular).with_size(100);
        let plan = dispatcher.plan(&entry);

        assert_eq!(tags_of(&plan), vec![CommandTag::Attribs, CommandTag::File]);
        assert!(plan.actions().contains(&Action::Bytes(100)));
        assert!(plan.actions().contains(&Action::Count(CounterKind::File)));
    }

    #[test]
    fn test_raw_and_fifo_count_no_bytes() {
        let dispatcher = Phase1Dispatcher::new(config());
        for kind in [EntryKind::Raw, EntryKind::Fifo, EntryKind::RegularExtended] {
            let plan = dispatcher.plan(&Entry::new("/data/dev", kind).with_size(4096));
            assert!(!plan.actions().iter().any(|a| matches!(a, Action::Bytes(_))));
            assert!(plan.actions().contains(&Action::Count(CounterKind::File)));
        }
    }

    #[test]
    fn test_hard_link_order() {
        let dispatcher = Phase1Dispatcher::new(config());
        let entry = Entry::new("/data/b", EntryKind::HardLinkSaved).with_link_target("/data/a");
        let plan = dispatcher.plan(&entry);
        let payloads: Vec<&str> = plan.frames().skip(1).map(Frame::payload).collect();
        assert_eq!(payloads, vec!["/data/b", "/data/a"]);
        assert!(plan.actions().contains(&Action::Count(CounterKind::HardLink)));
    }

    #[test]
    fn test_link_without_target_warns() {
        let dispatcher = Phase1Dispatcher::new(config());
        let plan = dispatcher.plan(&Entry::new("/data/l", EntryKind::SymLink));
        assert_eq!(plan.frames().count(), 0);
        assert_eq!(plan.warnings().next().unwrap().kind, WarningKind::NoFollow);
    }

    #[test]
    fn test_dir_end_is_inert() {
        let dispatcher = Phase1Dispatcher::new(config());
        assert!(dispatcher.plan(&Entry::new("/data/x", EntryKind::DirEnd)).is_empty());
    }

    #[test]
    fn test_reparse_and_junction_are_directories() {
        let dispatcher = Phase1Dispatcher::new(config());
        for kind in [EntryKind::Reparse, EntryKind::Junction] {
            let plan = dispatcher.plan(&Entry::new("/data/point", kind));
            assert_eq!(tags_of(&plan), vec![CommandTag::Attribs, CommandTag::Directory]);
            assert!(plan.actions().contains(&Action::Count(CounterKind::Dir)));
            assert!(plan.warnings().next().is_none());
        }
    }

    #[test]
    fn test_directory_as_file() {
        let config = ScanConfig {
            directory_as_file: true,
            ..config()
        };
        let extrameta = |_: &str, _: CommandTag| true;
        let dispatcher = Phase1Dispatcher::with_parts(config, StatEncoder, extrameta);
        let plan = dispatcher.plan(&Entry::new("/data/sub", EntryKind::DirBegin));
        assert_eq!(tags_of(&plan), vec![CommandTag::Attribs, CommandTag::File]);
        assert!(plan.actions().contains(&Action::Count(CounterKind::File)));
    }

    #[test]
    fn test_extrameta_reuses_record() {
        let extrameta = |path: &str, _: CommandTag| path.ends_with(".acl");
        let dispatcher = Phase1Dispatcher::with_parts(config(), StatEncoder, extrameta);
        let plan = dispatcher.plan(&Entry::new("/data/x.acl", EntryKind::Special));
        let frames: Vec<&Frame> = plan.frames().collect();

        assert_eq!(frames.len(), 4);
        assert_eq!(frames[2].tag(), CommandTag::Attribs);
        assert_eq!(frames[2].payload(), frames[0].payload());
        assert_eq!(frames[3].tag(), CommandTag::Metadata);
        assert!(plan.actions().contains(&Action::Count(CounterKind::Meta)));
    }

    #[test]
    fn test_encrypted_tags() {
        let config = ScanConfig {
            encrypted: true,
            ..config()
        };
        let extrameta = |_: &str, _: CommandTag| true;
        let dispatcher = Phase1Dispatcher::with_parts(config, StatEncoder, extrameta);
        let plan = dispatcher.plan(&Entry::new("/data/a", EntryKind::Regular));
        assert_eq!(
            tags_of(&plan),
            vec![
                CommandTag::Attribs,
                CommandTag::EncFile,
                CommandTag::Attribs,
                CommandTag::EncMetadata
            ]
        );
        assert!(plan.actions().contains(&Action::Count(CounterKind::EncFile)));
        assert!(plan.actions().contains(&Action::Count(CounterKind::EncMeta)));
    }

    #[test]
    fn test_efs_passthrough() {
        let config = ScanConfig {
            efs_passthrough: true,
            ..config()
        };
        let dispatcher = Phase1Dispatcher::new(config);
        let file = Entry::new("/data/secret", EntryKind::Regular)
            .with_size(7)
            .with_platform_attrs(FILE_ATTRIBUTE_ENCRYPTED);
        let plan = dispatcher.plan(&file);
        assert_eq!(tags_of(&plan), vec![CommandTag::Attribs, CommandTag::EfsFile]);
        assert!(plan.actions().contains(&Action::Bytes(7)));

        let link = Entry::new("/data/l", EntryKind::SymLink)
            .with_link_target("x")
            .with_platform_attrs(FILE_ATTRIBUTE_ENCRYPTED);
        let plan = dispatcher.plan(&link);
        assert_eq!(plan.frames().count(), 0);
        assert_eq!(plan.warnings().next().unwrap().kind, WarningKind::EfsUnsupported);
    }

    #[test]
    fn test_efs_directories() {
        let config = ScanConfig {
            efs_passthrough: true,
            ..config()
        };
        let dispatcher = Phase1Dispatcher::new(config);
        let begin = Entry::new("/data/vault", EntryKind::DirBegin)
            .with_size(4096)
            .with_platform_attrs(FILE_ATTRIBUTE_ENCRYPTED);
        let plan = dispatcher.plan(&begin);
        assert_eq!(tags_of(&plan), vec![CommandTag::Attribs, CommandTag::EfsFile]);
        assert!(plan.actions().contains(&Action::Count(CounterKind::EfsFile)));
        assert!(!plan.actions().iter().any(|a| matches!(a, Action::Bytes(_))));

        let end = Entry::new("/data/vault", EntryKind::DirEnd)
            .with_platform_attrs(FILE_ATTRIBUTE_ENCRYPTED);
        assert!(dispatcher.plan(&end).is_empty());
    }

    #[test]
    fn test_efs_flag_ignored_when_disabled() {
        let dispatcher = Phase1Dispatcher::new(config());
        let file = Entry::new("/data/secret", EntryKind::Regular)
            .with_platform_attrs(FILE_ATTRIBUTE_ENCRYPTED);
        assert_eq!(
            tags_of(&dispatcher.plan(&file)),
            vec![CommandTag::Attribs, CommandTag::File]
        );
    }

    #[test]
    fn test_error_messages() {
        let dispatcher = Phase1Dispatcher::new(config());
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let plan = dispatcher.plan(&Entry::error("/data/x", EntryKind::NoAccess, &err));
        assert_eq!(
            plan.warnings().next().unwrap().message,
            "Err: Could not access /data/x: Permission denied"
        );

        let plan = dispatcher.plan(&Entry::new("/data/y", EntryKind::Unknown(12)));
        assert_eq!(
            plan.warnings().next().unwrap().message,
            "Err: Unknown file type 12: /data/y"
        );

        let plan = dispatcher.plan(&Entry::new("/data/z", EntryKind::NoChange));
        assert_eq!(
            plan.warnings().next().unwrap().message,
            "Skip: File not saved. No change. /data/z"
        );
    }

    #[test]
    fn test_excluded_entry_is_silent() {
        let policy = InclusionPolicy::from_parts(
            vec![DirRule::include("/data")],
            Vec::new(),
            vec!["log".into()],
            &[],
            &[],
        )
        .unwrap();
        let config = ScanConfig { policy, ..config() };
        let dispatcher = Phase1Dispatcher::new(config);
        assert!(dispatcher.plan(&Entry::new("/data/b.log", EntryKind::Regular)).is_empty());
        assert!(dispatcher.plan(&Entry::new("/other/a", EntryKind::Regular)).is_empty());
    }

    #[test]
    fn test_compression_override_for_files_only() {
        let policy = InclusionPolicy::new().with_compression(
            vec![CompressionRule {
                path: "/data/media".into(),
                level: Compression::NONE,
            }],
            Vec::new(),
        );
        let config = ScanConfig { policy, ..config() };
        let dispatcher = Phase1Dispatcher::new(config);

        let file = dispatcher.plan(&Entry::new("/data/media/a.mp4", EntryKind::Regular));
        let record = file.frames().next().unwrap().payload().to_string();
        assert_eq!(
            StatEncoder::decode(&record).unwrap().compression,
            Compression::NONE
        );

        let dir = dispatcher.plan(&Entry::new("/data/media", EntryKind::DirBegin));
        let record = dir.frames().next().unwrap().payload().to_string();
        assert_eq!(StatEncoder::decode(&record).unwrap().compression, Compression::MAX);
    }

    #[test]
    fn test_dispatch_counts_and_failure() {
        let dispatcher = Phase1Dispatcher::new(config());
        let mut counters = Counters::new();
        let mut transport = RecordingTransport::failing_after(1);
        let entry = Entry::new("/data/a", EntryKind::Regular).with_size(5);

        let err = dispatcher
            .dispatch(&entry, &mut transport, &mut counters)
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(transport.frames().len(), 1);
        assert_eq!(counters.get(CounterKind::File).new, 0);

        let warnings = dispatcher
            .dispatch(
                &Entry::new("/data/mnt", EntryKind::DirNoFsChange),
                &mut RecordingTransport::new(),
                &mut counters,
            )
            .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(counters.warning(), 1);
    }
}
