use cairn_core::{
    BackupConfig, CommandTag, Compression, CounterKind, Counters, Disposition, Entry, EntryKind,
    InclusionPolicy, ScanConfig, TagSet,
};
use std::path::Path;

#[test]
fn test_counter_kind_for_each_selected_tag() {
    for encrypted in [false, true] {
        let tags = TagSet::for_encryption(encrypted);
        let file = CounterKind::for_tag(tags.file).unwrap();
        let meta = CounterKind::for_tag(tags.metadata).unwrap();
        if encrypted {
            assert_eq!(file, CounterKind::EncFile);
            assert_eq!(meta, CounterKind::EncMeta);
        } else {
            assert_eq!(file, CounterKind::File);
            assert_eq!(meta, CounterKind::Meta);
        }
    }
}

#[test]
fn test_counters_totals_across_kinds() {
    let mut counters = Counters::started_at(1_700_000_000);
    counters.increment(CounterKind::File, 4);
    counters.increment(CounterKind::Dir, 2);
    counters.increment_as(CounterKind::File, Disposition::Changed, 1);
    counters.increment_as(CounterKind::SoftLink, Disposition::Deleted, 3);
    counters.increment_bytes(100);
    counters.increment_bytes(28);
    counters.add_warning();

    let total = counters.total();
    assert_eq!(total.new, 6);
    assert_eq!(total.changed, 1);
    assert_eq!(total.deleted, 3);
    assert_eq!(total.total(), 7);
    assert_eq!(counters.byte(), 128);
    assert_eq!(counters.warning(), 1);
    assert_eq!(counters.start(), Some(1_700_000_000));
}

#[test]
fn test_counters_serialize() {
    let mut counters = Counters::new();
    counters.increment(CounterKind::HardLink, 1);
    let json = serde_json::to_string(&counters).unwrap();
    let back: Counters = serde_json::from_str(&json).unwrap();
    assert_eq!(back, counters);
}

#[test]
fn test_entry_error_keeps_os_text() {
    let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
    let entry = Entry::error("/root/secret", EntryKind::NoAccess, &err);
    assert_eq!(entry.error_text(), "Permission denied");
    assert_eq!(entry.kind, EntryKind::NoAccess);
}

#[test]
fn test_policy_defaults_include_everything() {
    let policy = InclusionPolicy::new();
    assert!(policy.is_included("/anything/at/all", false));
    assert_eq!(policy.compression_for("/x.gz", Compression::MAX), Compression::MAX);
}

#[test]
fn test_simple_scan_config() {
    let config = ScanConfig::new("/data");
    assert!(!config.encrypted);
    assert!(config.policy.is_included("/data", true));
}

#[test]
fn test_backup_config_full_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("cairn.toml");
    std::fs::write(
        &path,
        r#"
client = "web01"
server = "backup.example.com:4971"
status_port = 5000
compression = 5
directory_as_file = true
include = ["/srv"]
include_regex = ["\\.conf$"]
"#,
    )
    .unwrap();

    let config = BackupConfig::load(&path).unwrap();
    assert_eq!(config.status_port, 5000);
    assert_eq!(config.server.as_deref(), Some("backup.example.com:4971"));

    let scan = config.scan_config().unwrap();
    assert!(scan.directory_as_file);
    assert_eq!(scan.compression, Compression::new(5));
    assert!(scan.policy.is_included("/srv/nginx.conf", false));
    assert!(!scan.policy.is_included("/srv/index.html", false));

    let missing = BackupConfig::load(Path::new("/nonexistent/cairn.toml"));
    assert!(missing.is_err());
}

#[test]
fn test_tag_bytes() {
    assert_eq!(CommandTag::Attribs.as_byte(), b'r');
    assert_eq!(CommandTag::from_byte(b'k'), Some(CommandTag::EfsFile));
}
