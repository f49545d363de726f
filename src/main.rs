//! cairn - backup client scan stage and server status monitor.
//!
//! Usage:
//!   cairn scan                      Scan the configured directories, frames to stdout
//!   cairn scan --estimate           Count only, send nothing
//!   cairn scan --server HOST:PORT   Stream frames to a backup server
//!   cairn status                    One-shot overview of every client
//!   cairn status --client C --watch Follow one client
//!   cairn --help                    Show help

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, bail};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

use cairn_core::{BackupConfig, Counters};
use cairn_scan::{
    ExtraMetaProvider, FRAME_CHANNEL_SIZE, JwalkWalker, NullTransport, Phase1Scanner, ScanReport,
    StatEncoder, StreamTransport, Transport, forward_frames, frame_channel,
};
use cairn_status::{Browse, Snapshot, StatusClient, StatusRequest, detail_lines, summary};

const DEFAULT_LOG_FILTER: &str = "cairn=info,cairn_scan=info,cairn_status=info";

#[derive(Parser)]
#[command(
    name = "cairn",
    version,
    about = "Backup client scan stage and server status monitor",
    long_about = "cairn walks the directories named in its configuration and sends \
                  every entry to a backup server, or watches a server's status port.\n\n\
                  Logging is controlled with RUST_LOG."
)]
struct Cli {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the phase 1 file system scan
    Scan(ScanArgs),

    /// Query the server status port
    Status(StatusArgs),
}

#[derive(Args)]
struct ScanArgs {
    /// Count entries without sending any frames
    #[arg(short, long)]
    estimate: bool,

    /// Backup server address (overrides the configuration)
    #[arg(short, long, conflicts_with = "estimate")]
    server: Option<String>,

    /// Print the final counters as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct StatusArgs {
    /// Status port (overrides the configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// Client to show in detail
    #[arg(short = 'C', long)]
    client: Option<String>,

    /// Backup number of that client
    #[arg(short, long, requires = "client")]
    backup: Option<String>,

    /// Directory to list inside the backup
    #[arg(long, requires = "backup", conflicts_with = "browse_file")]
    browse_dir: Option<String>,

    /// Single file to look up inside the backup
    #[arg(long, requires = "backup")]
    browse_file: Option<String>,

    /// Keep polling and redraw on every answer
    #[arg(short, long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_logging();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Scan(args) => run_scan(&config, args).await,
        Command::Status(args) => run_status(&config, args).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the configuration file, falling back to defaults when the default
/// location does not exist.
fn load_config(path: Option<&Path>) -> Result<BackupConfig> {
    match path {
        Some(path) => BackupConfig::load(path).wrap_err("Failed to load configuration"),
        None => {
            let path = BackupConfig::default_path();
            if path.exists() {
                BackupConfig::load(&path).wrap_err("Failed to load configuration")
            } else {
                tracing::debug!(path = %path.display(), "no configuration file, using defaults");
                Ok(BackupConfig::default())
            }
        }
    }
}

/// Run phase 1 and report the estimate.
async fn run_scan(config: &BackupConfig, args: ScanArgs) -> Result<()> {
    let scan_config = config.scan_config().wrap_err("Invalid configuration")?;
    if scan_config.enabled_start_dirs().next().is_none() {
        bail!("Nothing to back up: no include directories configured");
    }

    let server = args.server.clone().or_else(|| config.server.clone());
    let to_stdout = !args.estimate && server.is_none();

    #[cfg(unix)]
    let scanner = Phase1Scanner::with_parts(scan_config, StatEncoder, cairn_scan::XattrProvider);
    #[cfg(not(unix))]
    let scanner = Phase1Scanner::with_parts(scan_config, StatEncoder, cairn_scan::NoExtraMeta);

    let report = if args.estimate {
        scan_blocking(scanner, NullTransport::new()).await?
    } else if let Some(addr) = server {
        let stream = TcpStream::connect(&addr)
            .await
            .wrap_err_with(|| format!("Failed to connect to {addr}"))?;
        tracing::info!(%addr, "connected to backup server");

        let (transport, rx) = frame_channel(FRAME_CHANNEL_SIZE);
        let forward = tokio::spawn(forward_frames(rx, stream));
        let report = scan_blocking(scanner, transport).await;
        let written = forward.await.wrap_err("Frame forwarder panicked")?;
        settle_forwarded(report, written)?
    } else {
        scan_blocking(scanner, StreamTransport::new(std::io::stdout())).await?
    };

    print_report(&report, args.json, to_stdout)
}

/// Combine the scan outcome with the forwarder's.
///
/// A socket failure closes the frame channel, so when both failed the
/// forwarder's error is the cause and is reported.
fn settle_forwarded(report: Result<ScanReport>, written: io::Result<u64>) -> Result<ScanReport> {
    let written = written.wrap_err("Failed to send frames")?;
    tracing::debug!(frames = written, "frames sent");
    report
}

/// Run the scanner on a blocking thread, logging progress as it goes.
async fn scan_blocking<M, T>(
    scanner: Phase1Scanner<StatEncoder, M>,
    transport: T,
) -> Result<ScanReport>
where
    M: ExtraMetaProvider + Send + 'static,
    T: Transport + Send + 'static,
{
    let mut progress_rx = scanner.subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(counters) = progress_rx.recv().await {
            log_progress(&counters);
        }
    });

    let walker = JwalkWalker::from_config(scanner.dispatcher().config());
    let result = tokio::task::spawn_blocking(move || {
        let mut transport = transport;
        scanner.run(&walker, &mut transport)
    })
    .await
    .wrap_err("Scanner thread panicked")?;

    // The sender is gone with the scanner, so the progress task ends.
    if let Err(e) = progress.await {
        tracing::warn!("progress logging stopped: {e}");
    }
    result.wrap_err("Phase 1 failed")
}

fn log_progress(counters: &Counters) {
    tracing::debug!(
        items = counters.total().total(),
        bytes = counters.byte(),
        "scan progress"
    );
}

/// Print the estimate. Goes to stderr when stdout carries frames.
fn print_report(report: &ScanReport, json: bool, to_stdout: bool) -> Result<()> {
    let text = if json {
        serde_json::to_string_pretty(&report.counters)?
    } else {
        let totals = report.counters.total();
        format!(
            "{} items, {} bytes, {} warning(s)",
            totals.total(),
            report.counters.byte(),
            report.warnings.len()
        )
    };
    if to_stdout {
        eprintln!("{text}");
    } else {
        println!("{text}");
    }
    Ok(())
}

/// Query the status port once, or follow it with `--watch`.
async fn run_status(config: &BackupConfig, args: StatusArgs) -> Result<()> {
    let port = args.port.unwrap_or(config.status_port);
    let browse = match (args.browse_dir, args.browse_file) {
        (Some(dir), _) => Some(Browse::Dir(dir)),
        (None, Some(file)) => Some(Browse::File(file)),
        (None, None) => None,
    };
    let request = StatusRequest::new(args.client.as_deref(), args.backup.as_deref(), browse);

    let client = StatusClient::connect(port, request)
        .await
        .wrap_err_with(|| format!("Failed to connect to status port {port}"))?;

    if args.watch {
        return watch_status(client, args.client.is_some()).await;
    }

    match client.snapshot().await.wrap_err("Status query failed")? {
        Snapshot::NoClients => println!("no clients"),
        Snapshot::Listing(text) => print!("{text}"),
        Snapshot::Records(records) if args.client.is_some() => {
            let now = Utc::now().timestamp();
            for record in &records {
                println!("{}", detail_lines(record, now).join("\n"));
            }
        }
        Snapshot::Records(records) => println!("{}", summary(&records)),
    }
    Ok(())
}

async fn watch_status(mut client: StatusClient, detail: bool) -> Result<()> {
    loop {
        let records = match client.next_batch().await {
            Ok(records) => records,
            Err(e) if e.is_malformed() => {
                tracing::warn!(target: "cairn::status", "{e}");
                continue;
            }
            Err(e) => return Err(e).wrap_err("Lost the status connection"),
        };

        let text = if detail {
            let now = Utc::now().timestamp();
            records
                .iter()
                .map(|r| detail_lines(r, now).join("\n"))
                .collect::<Vec<_>>()
                .join("\n\n")
        } else {
            summary(&records)
        };
        println!("{text}\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_error_wins_over_scan_error() {
        let scan = Err(color_eyre::eyre::eyre!("frame channel closed"));
        let socket = Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));

        let err = settle_forwarded(scan, socket).unwrap_err();
        assert!(format!("{err:#}").contains("connection reset"), "{err:#}");
    }

    #[test]
    fn test_scan_error_kept_when_forwarding_succeeded() {
        let scan = Err(color_eyre::eyre::eyre!("frame channel closed"));
        let err = settle_forwarded(scan, Ok(3)).unwrap_err();
        assert!(format!("{err:#}").contains("frame channel closed"));

        let report = settle_forwarded(Ok(ScanReport::default()), Ok(0)).unwrap();
        assert!(report.warnings.is_empty());
    }
}
