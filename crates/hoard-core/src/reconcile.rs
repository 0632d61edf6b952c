//! Startup reconciliation: persisted status vs. files on disk vs. run flags.
//!
//! Produces the work queue for the dispatcher. Only in-memory statuses are
//! corrected here; the next checkpoint persists them.

use crate::layout::OutputLayout;
use crate::ledger::{ItemStatus, Ledger};

/// Outcome of reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Ledger indices to dispatch, in ledger order.
    pub queue: Vec<usize>,
    /// `Done` items whose file is present.
    pub already_done: usize,
    /// `Failed` items skipped because no retry was requested.
    pub already_failed: usize,
    /// `InProgress` items left behind by an interrupted run.
    pub recovered_in_progress: usize,
    /// `Done` items demoted because their file is gone.
    pub demoted_missing: usize,
}

/// Walks the ledger in order and decides what still needs fetching.
///
/// - `Done` with the file present: satisfied. File missing: back to `Pending`.
/// - `InProgress`: stale marker from a dead run, back to `Pending`.
/// - `Failed`: skipped, or back to `Pending` when `retry_failed` is set.
/// - `Pending`: queued.
///
/// A `Failed` item never has a file on disk (the fetch unit removes partial
/// output), so file presence is only consulted for `Done`.
pub fn reconcile(ledger: &mut Ledger, layout: &OutputLayout, retry_failed: bool) -> Reconciliation {
    let mut out = Reconciliation::default();
    for index in 0..ledger.len() {
        let Some(item) = ledger.get(index) else {
            break;
        };
        let status = item.status;
        let requeue = match status {
            ItemStatus::Pending => true,
            ItemStatus::InProgress => {
                out.recovered_in_progress += 1;
                true
            }
            ItemStatus::Done => {
                if layout.path_for(index, item).exists() {
                    out.already_done += 1;
                    false
                } else {
                    tracing::debug!(key = %item.key, index, "done item has no file, re-queueing");
                    out.demoted_missing += 1;
                    true
                }
            }
            ItemStatus::Failed => {
                if retry_failed {
                    true
                } else {
                    out.already_failed += 1;
                    false
                }
            }
        };
        if requeue {
            if status != ItemStatus::Pending {
                // Index comes from 0..len, so this cannot be out of range.
                let _ = ledger.reset_to_pending(index);
            }
            out.queue.push(index);
        }
    }
    tracing::info!(
        queued = out.queue.len(),
        done = out.already_done,
        failed = out.already_failed,
        recovered = out.recovered_in_progress,
        demoted = out.demoted_missing,
        "reconciled ledger"
    );
    out
}
