//! Bounded-concurrency dispatch of the work queue.
//!
//! Keeps up to `concurrency` fetch tasks in flight; when one finishes, the
//! next queued item is started until the queue is empty. Items are marked
//! `InProgress` by the dispatcher itself and their transfers are issued in
//! queue order. Every `checkpoint_interval` dispatches the ledger is flushed,
//! and once more after the last task has been joined.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use crate::checkpoint::Checkpointer;
use crate::config::HoardConfig;
use crate::error::ArchiveError;
use crate::fetch::{FetchError, Fetcher};
use crate::layout::OutputLayout;
use crate::ledger::{ItemStatus, SharedLedger, WorkItem};
use crate::progress::{ProgressStats, ProgressTally};

/// Dispatcher knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Maximum transfers in flight (K).
    pub concurrency: usize,
    /// Flush the ledger after every this many dispatches (N).
    pub checkpoint_interval: usize,
}

impl DispatchConfig {
    pub fn from_config(cfg: &HoardConfig) -> Self {
        Self {
            concurrency: cfg.concurrency,
            checkpoint_interval: cfg.checkpoint_interval,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::from_config(&HoardConfig::default())
    }
}

/// Everything a run's fetch tasks share. Passed explicitly; nothing global.
pub struct DispatchContext {
    pub ledger: SharedLedger,
    pub layout: Arc<OutputLayout>,
    pub fetcher: Fetcher,
    pub checkpointer: Arc<Checkpointer>,
    pub tally: Arc<ProgressTally>,
    pub progress_tx: Option<mpsc::Sender<ProgressStats>>,
    pub config: DispatchConfig,
}

impl DispatchContext {
    fn item_task(&self) -> ItemTask {
        ItemTask {
            ledger: Arc::clone(&self.ledger),
            layout: Arc::clone(&self.layout),
            fetcher: self.fetcher.clone(),
            tally: Arc::clone(&self.tally),
            progress_tx: self.progress_tx.clone(),
        }
    }
}

/// What the dispatcher did before returning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Items handed to a fetch task.
    pub dispatched: usize,
    /// Tasks joined (equals `dispatched` once the barrier is passed).
    pub joined: usize,
}

/// Run fetch tasks for `queue` (ledger indices, dispatched in order).
///
/// Each item is begun in the ledger before its task is spawned, and the next
/// item is not dispatched until this one's transfer has been issued, so both
/// the `InProgress` marks and the GETs follow queue order.
///
/// Per-item failures become `Failed` in the ledger and never stop the loop.
/// An authentication failure stops further dispatch; in-flight tasks are
/// drained and checkpointed before the error is returned.
pub async fn dispatch(
    ctx: &DispatchContext,
    queue: &[usize],
) -> Result<DispatchOutcome, ArchiveError> {
    let max_concurrent = ctx.config.concurrency.max(1);
    let interval = ctx.config.checkpoint_interval.max(1);

    let mut next = queue.iter().copied();
    let mut join_set = JoinSet::new();
    let mut outcome = DispatchOutcome::default();
    let mut abort: Option<ArchiveError> = None;

    loop {
        while abort.is_none() && join_set.len() < max_concurrent {
            let Some(index) = next.next() else {
                break;
            };
            let item = match ctx.ledger.lock().await.begin(index) {
                Ok(item) => item,
                Err(e) => {
                    tracing::error!(index, "cannot begin item, stopping dispatch: {}", e);
                    abort = Some(e.into());
                    break;
                }
            };
            let (started_tx, started_rx) = oneshot::channel();
            join_set.spawn(ctx.item_task().run(index, item, started_tx));
            outcome.dispatched += 1;
            // Dropped unsent when the destination could not be created.
            let _ = started_rx.await;
            if outcome.dispatched % interval == 0 {
                ctx.checkpointer.flush().await;
            }
        }

        let Some(res) = join_set.join_next().await else {
            break;
        };
        outcome.joined += 1;
        let res = res.map_err(ArchiveError::from).and_then(|r| r);
        if let Err(e) = res {
            if abort.is_none() {
                tracing::error!(
                    in_flight = join_set.len(),
                    "stopping dispatch, draining in-flight transfers: {}",
                    e
                );
                abort = Some(e);
            } else {
                tracing::warn!("while draining: {}", e);
            }
        }
    }

    ctx.checkpointer.flush().await;

    match abort {
        Some(e) => Err(e),
        None => Ok(outcome),
    }
}

/// Handles one begun ledger item: fetch on the blocking pool, record.
struct ItemTask {
    ledger: SharedLedger,
    layout: Arc<OutputLayout>,
    fetcher: Fetcher,
    tally: Arc<ProgressTally>,
    progress_tx: Option<mpsc::Sender<ProgressStats>>,
}

impl ItemTask {
    async fn run(
        self,
        index: usize,
        item: WorkItem,
        started: oneshot::Sender<()>,
    ) -> Result<(), ArchiveError> {
        let key = item.key.clone();
        let dest = self.layout.path_for(index, &item);
        tracing::debug!(key = %key, index, attempt = item.attempts, dest = %dest.display(), "fetching");

        let fetcher = self.fetcher.clone();
        let joined = tokio::task::spawn_blocking(move || {
            fetcher.fetch_signalled(&item, &dest, move || {
                let _ = started.send(());
            })
        })
        .await;

        {
            let mut ledger = self.ledger.lock().await;
            match joined {
                Ok(Ok(bytes)) => {
                    ledger.finish(index, ItemStatus::Done)?;
                    self.tally.record_success(bytes);
                    tracing::debug!(key = %key, index, bytes, "done");
                }
                Ok(Err(e)) if e.is_authentication() => {
                    // Not the item's fault: leave it for the next run.
                    ledger.reset_to_pending(index)?;
                    return Err(auth_error(key, e));
                }
                Ok(Err(e)) => {
                    ledger.finish(index, ItemStatus::Failed)?;
                    self.tally.record_failure();
                    tracing::warn!(key = %key, index, kind = ?e.kind(), "fetch failed: {}", e);
                }
                Err(join_err) => {
                    ledger.finish(index, ItemStatus::Failed)?;
                    self.tally.record_failure();
                    tracing::error!(key = %key, index, "fetch task panicked: {}", join_err);
                }
            }
        }

        if let Some(tx) = &self.progress_tx {
            // Receiver gone just means nobody is watching.
            let _ = tx.send(self.tally.stats()).await;
        }
        Ok(())
    }
}

fn auth_error(key: String, source: FetchError) -> ArchiveError {
    ArchiveError::Authentication { key, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{Canned, FakeTransport};
    use crate::fetch::{TransferError, Transport};
    use crate::ledger::{Ledger, WorkItem};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn url(i: usize) -> String {
        format!("https://media.test/{i}")
    }

    fn ledger_of(n: usize) -> Ledger {
        Ledger::from_items(
            (0..n)
                .map(|i| WorkItem::new(format!("k{i}"), "jpg", url(i), 4))
                .collect(),
        )
    }

    fn serving_all(n: usize) -> FakeTransport {
        (0..n).fold(FakeTransport::new(), |t, i| {
            t.with(&url(i), Canned::Body(b"jpegdata".to_vec()))
        })
    }

    fn context(
        dir: &std::path::Path,
        ledger: SharedLedger,
        transport: Arc<dyn Transport>,
        config: DispatchConfig,
        queued: usize,
    ) -> DispatchContext {
        DispatchContext {
            ledger: ledger.clone(),
            layout: Arc::new(OutputLayout::new(dir.join("media"), queued, 10_000, 10_000)),
            fetcher: Fetcher::new(transport),
            checkpointer: Arc::new(Checkpointer::new(dir.join("ledger.json"), ledger)),
            tally: Arc::new(ProgressTally::new(queued, 0, 0)),
            progress_tx: None,
            config,
        }
    }

    /// Records the largest number of `InProgress` items seen while a transfer runs.
    struct ObservingTransport {
        ledger: SharedLedger,
        peak: AtomicUsize,
    }

    impl Transport for ObservingTransport {
        fn get(&self, _url: &str, sink: &mut dyn Write) -> Result<u64, TransferError> {
            let now = self.ledger.blocking_lock().in_progress();
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            sink.write_all(b"abcd").map_err(TransferError::Write)?;
            Ok(4)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_progress_never_exceeds_cap() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_of(40).into_shared();
        let transport = Arc::new(ObservingTransport {
            ledger: ledger.clone(),
            peak: AtomicUsize::new(0),
        });
        let cfg = DispatchConfig {
            concurrency: 3,
            checkpoint_interval: 100,
        };
        let ctx = context(dir.path(), ledger.clone(), transport.clone(), cfg, 40);
        let queue: Vec<usize> = (0..40).collect();

        let out = dispatch(&ctx, &queue).await.unwrap();
        assert_eq!(out.dispatched, 40);
        assert_eq!(out.joined, 40);
        let peak = transport.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak in-progress was {peak}");
        assert_eq!(ledger.lock().await.status_counts().done, 40);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn transfers_start_in_queue_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_of(200).into_shared();
        let transport = Arc::new(serving_all(200).with_delay(Duration::from_millis(1)));
        let cfg = DispatchConfig {
            concurrency: 10,
            checkpoint_interval: 50,
        };
        let ctx = context(dir.path(), ledger.clone(), transport.clone(), cfg, 200);
        let queue: Vec<usize> = (0..200).collect();

        dispatch(&ctx, &queue).await.unwrap();

        let expected: Vec<String> = queue.iter().map(|&i| url(i)).collect();
        assert_eq!(transport.call_order(), expected);
        assert_eq!(ledger.lock().await.status_counts().done, 200);
    }

    /// Snapshot taken at the Nth dispatch never shows a later item begun
    /// before an earlier one.
    struct PrefixCheckingTransport {
        ledger: SharedLedger,
        violations: AtomicUsize,
    }

    impl Transport for PrefixCheckingTransport {
        fn get(&self, url: &str, sink: &mut dyn Write) -> Result<u64, TransferError> {
            let me: usize = url.rsplit('/').next().and_then(|s| s.parse().ok()).unwrap();
            let l = self.ledger.blocking_lock();
            if l.items()[..me].iter().any(|i| i.status == ItemStatus::Pending) {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
            drop(l);
            sink.write_all(b"abcd").map_err(TransferError::Write)?;
            Ok(4)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn items_are_begun_in_queue_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_of(120).into_shared();
        let transport = Arc::new(PrefixCheckingTransport {
            ledger: ledger.clone(),
            violations: AtomicUsize::new(0),
        });
        let cfg = DispatchConfig {
            concurrency: 10,
            checkpoint_interval: 7,
        };
        let ctx = context(dir.path(), ledger.clone(), transport.clone(), cfg, 120);
        let queue: Vec<usize> = (0..120).collect();

        dispatch(&ctx, &queue).await.unwrap();
        assert_eq!(transport.violations.load(Ordering::SeqCst), 0);
        assert_eq!(ledger.lock().await.status_counts().done, 120);
    }

    #[tokio::test]
    async fn checkpoint_cadence_250_items_interval_100() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_of(250).into_shared();
        let cfg = DispatchConfig {
            concurrency: 8,
            checkpoint_interval: 100,
        };
        let ctx = context(dir.path(), ledger, Arc::new(serving_all(250)), cfg, 250);
        let queue: Vec<usize> = (0..250).collect();

        dispatch(&ctx, &queue).await.unwrap();
        assert_eq!(ctx.checkpointer.flushes(), 3);

        let saved = Ledger::load_from_path(&dir.path().join("ledger.json"))
            .unwrap()
            .unwrap();
        assert_eq!(saved.status_counts().done, 250);
        assert!(saved.items().iter().all(|i| i.attempts == 1));
    }

    #[tokio::test]
    async fn failures_are_recorded_without_stopping() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_of(4).into_shared();
        let transport = FakeTransport::new()
            .with(&url(0), Canned::Body(b"jpegdata".to_vec()))
            .with(&url(1), Canned::Status(503))
            .with(&url(2), Canned::Body(b"x".to_vec()))
            .with(&url(3), Canned::Body(b"jpegdata".to_vec()));
        let ctx = context(dir.path(), ledger.clone(), Arc::new(transport), DispatchConfig::default(), 4);

        dispatch(&ctx, &[0, 1, 2, 3]).await.unwrap();

        let l = ledger.lock().await;
        let statuses: Vec<ItemStatus> = l.items().iter().map(|i| i.status).collect();
        assert_eq!(
            statuses,
            vec![
                ItemStatus::Done,
                ItemStatus::Failed,
                ItemStatus::Failed,
                ItemStatus::Done
            ]
        );
        // Validation failure leaves nothing behind.
        assert!(!ctx.layout.path_for(2, &l.items()[2]).exists());
        assert!(ctx.layout.path_for(3, &l.items()[3]).exists());
        let stats = ctx.tally.stats();
        assert_eq!((stats.succeeded, stats.failed), (2, 2));
    }

    #[tokio::test]
    async fn authentication_failure_drains_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_of(30).into_shared();
        let transport = (1..30)
            .fold(FakeTransport::new(), |t, i| {
                t.with(&url(i), Canned::Body(b"jpegdata".to_vec()))
            })
            .with(&url(0), Canned::Status(401))
            .with_delay(Duration::from_millis(2));
        let transport = Arc::new(transport);
        let cfg = DispatchConfig {
            concurrency: 2,
            checkpoint_interval: 100,
        };
        let ctx = context(dir.path(), ledger.clone(), transport.clone(), cfg, 30);
        let queue: Vec<usize> = (0..30).collect();

        let err = dispatch(&ctx, &queue).await.unwrap_err();
        assert!(err.is_authentication());
        // Dispatch stopped early; only items already in flight were drained.
        assert!(transport.total_calls() < 30, "calls: {}", transport.total_calls());

        let l = ledger.lock().await;
        assert_eq!(l.items()[0].status, ItemStatus::Pending);
        assert_eq!(l.items()[0].attempts, 1);
        assert_eq!(l.in_progress(), 0);

        // Final checkpoint happened even though the run aborted.
        let saved = Ledger::load_from_path(&dir.path().join("ledger.json"))
            .unwrap()
            .unwrap();
        assert_eq!(&saved, &*l);
    }

    #[tokio::test]
    async fn progress_snapshots_are_sent() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_of(5).into_shared();
        let (tx, mut rx) = mpsc::channel(16);
        let mut ctx = context(dir.path(), ledger, Arc::new(serving_all(5)), DispatchConfig::default(), 5);
        ctx.progress_tx = Some(tx);

        dispatch(&ctx, &[0, 1, 2, 3, 4]).await.unwrap();
        drop(ctx);

        let mut last = None;
        while let Some(s) = rx.recv().await {
            last = Some(s);
        }
        let last = last.unwrap();
        assert_eq!(last.completed, 5);
        assert_eq!(last.queued, 5);
    }

    #[tokio::test]
    async fn empty_queue_still_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_of(2).into_shared();
        let ctx = context(dir.path(), ledger, Arc::new(FakeTransport::new()), DispatchConfig::default(), 0);
        let out = dispatch(&ctx, &[]).await.unwrap();
        assert_eq!(out, DispatchOutcome::default());
        assert_eq!(ctx.checkpointer.flushes(), 1);
    }
}
