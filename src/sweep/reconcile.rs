use crate::error::{FetchError, ScanError};
use crate::sweep::config::SweepConfig;
use crate::sweep::ledger::Ledger;
use crate::sweep::matcher::{KeyRule, match_units};
use crate::sweep::records::{RecordFetcher, RemoteRecord};
use crate::sweep::scanner::{ScanOptions, scan};
use crate::sweep::util::CancelFlag;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug)]
pub struct PassOutcome {
    pub ledger: Ledger,
    pub fetch_error: Option<FetchError>,
    pub fetcher_label: String,
    pub record_count: usize,
    pub size_truncated: bool,
    pub elapsed: Duration,
}

pub fn scan_options(cfg: &SweepConfig, force_size: bool, cancel: CancelFlag) -> ScanOptions {
    ScanOptions {
        compute_size: cfg.get_size || force_size,
        size_budget: cfg.size_budget(),
        cancel,
    }
}

fn spawn_fetch(
    fetcher: Arc<dyn RecordFetcher>,
) -> mpsc::Receiver<Result<Vec<RemoteRecord>, FetchError>> {
    let (tx, rx) = mpsc::channel();
    let worker = Arc::clone(&fetcher);
    let worker_tx = tx.clone();
    let spawned = thread::Builder::new()
        .name("hdcs-fetch".to_string())
        .spawn(move || {
            // The receiver may have given up already; nothing to report then.
            let _ = worker_tx.send(worker.fetch_records());
        });
    if let Err(err) = spawned {
        warn!(error = %err, "could not start fetch thread; fetching inline");
        let _ = tx.send(fetcher.fetch_records());
    }
    rx
}

/// One reconciliation pass: fetch on a background thread while the scan runs
/// here, then match and build a fresh ledger. Only a scan failure is fatal;
/// a slow or failing fetch turns every entry into ReviewNeeded.
pub fn run_pass(
    cfg: &SweepConfig,
    fetcher: Arc<dyn RecordFetcher>,
    opts: &ScanOptions,
) -> Result<PassOutcome, ScanError> {
    let started = Instant::now();
    let fetcher_label = fetcher.describe();
    let timeout = cfg.fetch_timeout();
    let deadline = started + timeout;
    let rx = spawn_fetch(fetcher);

    let inventory = scan(&cfg.backups_location, Some(cfg.deletion_location.as_path()), opts)?;
    info!(
        root = %cfg.backups_location.display(),
        units = inventory.units.len(),
        skipped = inventory.skipped.len(),
        "scan finished"
    );

    let fetched = match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(result) => result,
        // The fetch thread is left detached; its late result is dropped.
        Err(RecvTimeoutError::Timeout) => Err(FetchError::TimedOut(timeout.as_secs())),
        Err(RecvTimeoutError::Disconnected) => Err(FetchError::Interrupted),
    };
    let (records, fetch_error) = match fetched {
        Ok(records) => {
            info!(source = %fetcher_label, records = records.len(), "records fetched");
            (records, None)
        }
        Err(err) => {
            warn!(source = %fetcher_label, error = %err, "record fetch failed; every folder needs review");
            (Vec::new(), Some(err))
        }
    };

    let rule = KeyRule::from_config(&cfg.matching);
    let results = match &fetch_error {
        None => match_units(&inventory.units, Ok(&records), &rule),
        Some(err) => match_units(&inventory.units, Err(err), &rule),
    };
    let size_truncated = inventory.size_truncated;
    let ledger = Ledger::build(inventory, results);

    Ok(PassOutcome {
        ledger,
        fetch_error,
        fetcher_label,
        record_count: records.len(),
        size_truncated,
        elapsed: started.elapsed(),
    })
}
