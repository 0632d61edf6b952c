//! One archive invocation end to end, plus the `status` and `reset` helpers.
//!
//! `run` opens (or seeds) the ledger under an exclusive lock, reconciles it
//! against the output directory, dispatches the queue and reports.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;

use crate::catalog::{validate_listing, Catalog};
use crate::checkpoint::Checkpointer;
use crate::config::HoardConfig;
use crate::dispatch::{dispatch, DispatchConfig, DispatchContext};
use crate::error::ArchiveError;
use crate::fetch::{Fetcher, Transport};
use crate::layout::OutputLayout;
use crate::ledger::{remove_snapshot, Ledger, LedgerLock, StatusCounts};
use crate::progress::{ProgressStats, ProgressTally, RunSummary};
use crate::reconcile::{reconcile, Reconciliation};

/// Inputs for one run besides the config.
pub struct RunOptions<'a> {
    /// Used only when no snapshot exists yet.
    pub catalog: Option<&'a dyn Catalog>,
    /// Re-queue items that failed in earlier runs.
    pub retry_failed: bool,
    pub transport: Arc<dyn Transport>,
    pub progress_tx: Option<mpsc::Sender<ProgressStats>>,
}

/// What a completed run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub ledger_path: PathBuf,
    /// True when the ledger was created from the catalog in this run.
    pub seeded: bool,
    pub reconciliation: Reconciliation,
    pub summary: RunSummary,
    /// Ledger counts after the final checkpoint.
    pub counts: StatusCounts,
    pub checkpoint_failures: u64,
    /// False when the final checkpoint failed.
    pub durable: bool,
}

/// Run the archive: open or seed, reconcile, dispatch, report.
pub async fn run(cfg: &HoardConfig, opts: RunOptions<'_>) -> Result<RunReport, ArchiveError> {
    let ledger_path = cfg.resolved_ledger_path().map_err(ArchiveError::Ledger)?;
    let _lock = LedgerLock::acquire(&ledger_path)?;

    let (mut ledger, seeded) = open_or_seed(cfg, &ledger_path, opts.catalog)?;
    let layout = OutputLayout::from_config(cfg, ledger.len());
    if layout.is_sharded() {
        tracing::info!(
            total = ledger.len(),
            shard_capacity = cfg.shard_capacity,
            "library exceeds split threshold, using numbered shard directories"
        );
    }

    let reconciliation = reconcile(&mut ledger, &layout, opts.retry_failed);

    let shared = ledger.into_shared();
    let checkpointer = Arc::new(Checkpointer::new(&ledger_path, Arc::clone(&shared)));
    let tally = Arc::new(ProgressTally::new(
        reconciliation.queue.len(),
        reconciliation.already_done,
        reconciliation.already_failed,
    ));
    let ctx = DispatchContext {
        ledger: Arc::clone(&shared),
        layout: Arc::new(layout),
        fetcher: Fetcher::new(opts.transport),
        checkpointer: Arc::clone(&checkpointer),
        tally: Arc::clone(&tally),
        progress_tx: opts.progress_tx,
        config: DispatchConfig::from_config(cfg),
    };

    let outcome = dispatch(&ctx, &reconciliation.queue).await?;
    let counts = shared.lock().await.status_counts();
    tracing::info!(
        dispatched = outcome.dispatched,
        done = counts.done,
        failed = counts.failed,
        pending = counts.pending,
        "run finished"
    );

    Ok(RunReport {
        ledger_path,
        seeded,
        reconciliation,
        summary: tally.summary(),
        counts,
        checkpoint_failures: checkpointer.failures(),
        durable: checkpointer.is_durable(),
    })
}

fn open_or_seed(
    cfg: &HoardConfig,
    ledger_path: &Path,
    catalog: Option<&dyn Catalog>,
) -> Result<(Ledger, bool), ArchiveError> {
    if let Some(ledger) = Ledger::load_from_path(ledger_path).map_err(ArchiveError::Ledger)? {
        if catalog.is_some() {
            tracing::info!(
                path = %ledger_path.display(),
                "ledger exists, ignoring catalog (reset to start over)"
            );
        }
        tracing::info!(items = ledger.len(), "loaded ledger");
        return Ok((ledger, false));
    }

    let Some(catalog) = catalog else {
        return Err(ArchiveError::NoLedger(ledger_path.to_path_buf()));
    };
    let listing = catalog.listing().map_err(ArchiveError::Catalog)?;
    validate_listing(&listing).map_err(ArchiveError::Catalog)?;
    let ledger = Ledger::seed(&listing, cfg.default_min_bytes);
    ledger
        .save_to_path(ledger_path)
        .context("write initial ledger")
        .map_err(ArchiveError::Ledger)?;
    tracing::info!(items = ledger.len(), path = %ledger_path.display(), "seeded ledger from catalog");
    Ok((ledger, true))
}

/// Counts from the snapshot, or None when no run has happened yet.
/// Reads the snapshot only; no lock, no filesystem checks.
pub fn status(ledger_path: &Path) -> anyhow::Result<Option<StatusCounts>> {
    Ok(Ledger::load_from_path(ledger_path)?.map(|l| l.status_counts()))
}

/// What `reset` removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub removed_ledger: bool,
    pub removed_output: bool,
}

/// Delete the snapshot and the output directory. Refuses while a run holds the lock.
pub fn reset(ledger_path: &Path, output_dir: &Path) -> Result<ResetReport, ArchiveError> {
    let _lock = LedgerLock::acquire(ledger_path)?;
    let removed_ledger = remove_snapshot(ledger_path).map_err(ArchiveError::Ledger)?;
    let removed_output = match std::fs::remove_dir_all(output_dir) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            return Err(ArchiveError::Ledger(anyhow::Error::new(e).context(format!(
                "remove output directory {}",
                output_dir.display()
            ))))
        }
    };
    tracing::info!(removed_ledger, removed_output, "reset");
    Ok(ResetReport {
        removed_ledger,
        removed_output,
    })
}
