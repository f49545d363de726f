//! Text rendering of status records.

use chrono::{Local, TimeZone};
use itertools::Itertools;

use cairn_core::{Counters, KindCounts};

use crate::record::{BackupInfo, Phase, RunState, StatusRecord};

/// Format a byte size in human-readable form.
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Format a unix timestamp as local date and time.
pub fn format_date(ts: i64) -> String {
    Local
        .timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Format a number of seconds as a duration.
pub fn time_taken(secs: i64) -> String {
    let secs = secs.max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else {
        format!("{}d {}h {}m", secs / 86400, (secs % 86400) / 3600, (secs % 3600) / 60)
    }
}

/// Label of a prior backup: zero-padded number and date, or `never`.
pub fn backup_label(backup: &BackupInfo) -> String {
    match backup.timestamp {
        Some(ts) => format!("{:07} {}", backup.number, format_date(ts)),
        None => "never".to_string(),
    }
}

/// Seconds left at the current transfer rate.
///
/// The rate is whole bytes per second; `None` until it is non-zero.
pub fn time_left(estimated: u64, transferred: u64, elapsed: i64) -> Option<i64> {
    let elapsed = u64::try_from(elapsed).ok().filter(|e| *e > 0)?;
    let rate = transferred / elapsed;
    if rate == 0 {
        return None;
    }
    let left = estimated.saturating_sub(transferred) / rate;
    Some(i64::try_from(left).unwrap_or(i64::MAX))
}

fn state_text(record: &StatusRecord) -> String {
    match record.run_state {
        RunState::Running => record.phase.map(|p| p.to_string()).unwrap_or_default(),
        other => other.to_string(),
    }
}

/// One line per client for the overview.
pub fn summary_line(record: &StatusRecord) -> String {
    let client = record.client.as_str();
    let state = state_text(record);
    if record.run_state != RunState::Running {
        let last = record
            .backups
            .first()
            .map(|b| format!(" last backup: {}", backup_label(b)))
            .unwrap_or_default();
        return format!("{client:<14.14} {state:<14}{last}");
    }

    let done = record.progress.total().total();
    let estimated = record.estimate.total().total();
    let percent = if estimated > 0 {
        done.saturating_mul(100) / estimated
    } else {
        0
    };
    let bytes = match record.progress.byte() {
        0 => String::new(),
        n => format!(" {}", format_size(n)),
    };
    format!("{client:<14.14} {state:<14} {done}/{estimated} {percent}%{bytes}")
}

fn table_header(restore_like: bool) -> String {
    if restore_like {
        format!("{:>15} {:>9} {:>9} {:>9}", "", "", "Attempted", "Expected")
    } else {
        format!(
            "{:>15} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}",
            "", "New", "Changed", "Unchanged", "Deleted", "Total", "Scanned"
        )
    }
}

/// Row for one kind, plus a percentage row when asked for.
fn detail_rows(
    lines: &mut Vec<String>,
    restore_like: bool,
    field: &str,
    counts: KindCounts,
    scanned: u64,
    percent: bool,
) {
    let total = counts.total();
    if total == 0 && counts.deleted == 0 && scanned == 0 {
        return;
    }
    if restore_like {
        lines.push(format!("{field:>15} {:>9} {total:>9} {scanned:>9}", ""));
    } else {
        lines.push(format!(
            "{field:>15} {:>9} {:>9} {:>9} {:>9} {total:>9} {scanned:>9}",
            counts.new, counts.changed, counts.same, counts.deleted
        ));
    }
    if percent && scanned > 0 {
        let pct = format!("{}%", total.saturating_mul(100) / scanned);
        if restore_like {
            lines.push(format!("{:>15} {:>9} {pct:>9} {:>9}", "", "", ""));
        } else {
            lines.push(format!(
                "{:>15} {:>9} {:>9} {:>9} {:>9} {pct:>9} {:>9}",
                "", "", "", "", "", ""
            ));
        }
    }
}

fn bytes_row(lines: &mut Vec<String>, field: &str, bytes: u64) {
    if bytes > 0 {
        lines.push(format!("{field}: {bytes} ({})", format_size(bytes)));
    }
}

fn progress_bytes(lines: &mut Vec<String>, phase: Option<Phase>, progress: &Counters) {
    let byte_label = match phase {
        Some(Phase::Backup) => Some("Bytes in backup"),
        Some(Phase::Restoring) => Some("Bytes attempted"),
        Some(Phase::Verifying) => Some("Bytes checked"),
        _ => None,
    };
    if let Some(label) = byte_label {
        bytes_row(lines, label, progress.byte());
    }
    if phase == Some(Phase::Backup) {
        bytes_row(lines, "Bytes received", progress.recv_byte());
    }
    if matches!(phase, Some(Phase::Backup | Phase::Restoring)) {
        bytes_row(lines, "Bytes sent", progress.sent_byte());
    }
}

/// Full view of one client. `now` is the current unix time.
pub fn detail_lines(record: &StatusRecord, now: i64) -> Vec<String> {
    let mut lines = vec![format!("Client: {}", record.client)];

    if record.run_state != RunState::Running {
        lines.push(format!("Status: {}", record.run_state));
        for (i, backup) in record.backups.iter().enumerate() {
            let prefix = if i == 0 { "Backup list:" } else { "" };
            lines.push(format!("{prefix:<12} {}", backup_label(backup)));
        }
        return lines;
    }
    if let Some(phase) = record.phase {
        lines.push(format!("Status: running ({phase})"));
    }

    let restore_like = record.phase.is_some_and(Phase::is_restore_like);
    let (estimate, progress) = (&record.estimate, &record.progress);

    lines.push(String::new());
    lines.push(table_header(restore_like));
    for (kind, counts) in progress.iter() {
        let scanned = estimate.get(kind).total();
        detail_rows(&mut lines, restore_like, &kind.to_string(), counts, scanned, false);
    }
    detail_rows(
        &mut lines,
        restore_like,
        "Total",
        progress.total(),
        estimate.total().total(),
        true,
    );
    lines.push(String::new());
    let warnings = KindCounts {
        new: progress.warning(),
        ..KindCounts::default()
    };
    detail_rows(&mut lines, restore_like, "Warnings", warnings, 0, true);

    bytes_row(&mut lines, "Bytes estimated", estimate.byte());
    progress_bytes(&mut lines, record.phase, progress);

    if let Some(start) = estimate.start() {
        let elapsed = now.saturating_sub(start);
        lines.push(format!("Start time: {}", format_date(start)));
        lines.push(format!("Time taken: {}", time_taken(elapsed)));
        if let Some(left) = time_left(estimate.byte(), progress.byte(), elapsed) {
            lines.push(format!("Time left: {}", time_taken(left)));
        }
    }

    if let Some(path) = record.path.as_deref().filter(|p| !p.is_empty()) {
        lines.push(String::new());
        lines.push(path.to_string());
    }
    lines
}

/// Overview of every client, one line each.
pub fn summary(records: &[StatusRecord]) -> String {
    records.iter().map(summary_line).join("\n")
}
