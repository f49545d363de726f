//! Phase 1 driver: walks every start directory through the dispatcher.

use chrono::Utc;
use tokio::sync::broadcast;

use cairn_core::{Counters, ScanConfig, ScanError, ScanWarning};

use crate::dispatcher::Phase1Dispatcher;
use crate::encode::{AttributeEncoder, StatEncoder};
use crate::extrameta::{ExtraMetaProvider, NoExtraMeta};
use crate::transport::Transport;
use crate::walker::TreeWalk;

/// Entries between two progress broadcasts.
const PROGRESS_INTERVAL: u64 = 1000;

/// Outcome of a completed phase 1 scan.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Estimate counters.
    pub counters: Counters,
    /// Per-entry warnings, in walk order.
    pub warnings: Vec<ScanWarning>,
}

/// Runs phase 1 over the configured start directories.
pub struct Phase1Scanner<E = StatEncoder, M = NoExtraMeta> {
    dispatcher: Phase1Dispatcher<E, M>,
    progress_tx: broadcast::Sender<Counters>,
}

impl Phase1Scanner {
    pub fn new(config: ScanConfig) -> Self {
        Self::with_parts(config, StatEncoder, NoExtraMeta)
    }
}

impl<E: AttributeEncoder, M: ExtraMetaProvider> Phase1Scanner<E, M> {
    pub fn with_parts(config: ScanConfig, encoder: E, extrameta: M) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            dispatcher: Phase1Dispatcher::with_parts(config, encoder, extrameta),
            progress_tx,
        }
    }

    /// Subscribe to periodic snapshots of the estimate counters.
    pub fn subscribe(&self) -> broadcast::Receiver<Counters> {
        self.progress_tx.subscribe()
    }

    pub fn dispatcher(&self) -> &Phase1Dispatcher<E, M> {
        &self.dispatcher
    }

    /// Walk every enabled start directory in order and send its entries.
    ///
    /// The first transport failure stops the scan and is returned; nothing
    /// else is fatal.
    pub fn run<W, T>(&self, walker: &W, transport: &mut T) -> Result<ScanReport, ScanError>
    where
        W: TreeWalk + ?Sized,
        T: Transport,
    {
        tracing::info!(target: "cairn::scan", "Phase 1 begin (file system scan)");

        let mut report = ScanReport::default();
        report.counters.mark_started(Utc::now().timestamp());

        let result = self.walk_all(walker, transport, &mut report);

        log_end_counters(&report.counters);
        let _ = self.progress_tx.send(report.counters.clone());
        if let Err(ref e) = result {
            tracing::error!(target: "cairn::scan", error = %e, "Error in phase 1");
        }
        tracing::info!(target: "cairn::scan", "Phase 1 end (file system scan)");

        result.map(|()| report)
    }

    fn walk_all<W, T>(
        &self,
        walker: &W,
        transport: &mut T,
        report: &mut ScanReport,
    ) -> Result<(), ScanError>
    where
        W: TreeWalk + ?Sized,
        T: Transport,
    {
        let mut seen: u64 = 0;
        for start in self.dispatcher.config().enabled_start_dirs() {
            tracing::debug!(target: "cairn::scan", path = %start.path, "walking start directory");
            for entry in walker.walk(&start.path) {
                let warnings = self
                    .dispatcher
                    .dispatch(&entry, transport, &mut report.counters)?;
                report.warnings.extend(warnings);

                seen += 1;
                if seen % PROGRESS_INTERVAL == 0 {
                    let _ = self.progress_tx.send(report.counters.clone());
                }
            }
        }
        Ok(())
    }
}

fn log_end_counters(counters: &Counters) {
    for (kind, counts) in counters.iter().filter(|(_, c)| !c.is_empty()) {
        tracing::info!(target: "cairn::scan", "{kind:>20}: {}", counts.total());
    }
    let total = counters.total();
    tracing::info!(
        target: "cairn::scan",
        items = total.total(),
        bytes = counters.byte(),
        warnings = counters.warning(),
        "phase 1 totals"
    );
}
