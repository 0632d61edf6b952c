//! Run progress: counters, live snapshots and the end-of-run summary.
//!
//! Observational only. The dispatcher bumps counters once an item's terminal
//! status is known; consumers compute rate = finished / elapsed_secs and
//! ETA = remaining / rate.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Snapshot of run progress (CLI-friendly).
#[derive(Debug, Clone)]
pub struct ProgressStats {
    /// Items finished this run (succeeded + failed).
    pub completed: u64,
    /// Items queued for this run.
    pub queued: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Bytes kept from successful transfers.
    pub bytes: u64,
    /// Elapsed time since dispatch started (seconds).
    pub elapsed_secs: f64,
}

impl ProgressStats {
    /// Items per second (0 if elapsed is 0).
    pub fn items_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.completed as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if rate is 0 and work remains).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.queued.saturating_sub(self.completed);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.items_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.queued == 0 {
            return 1.0;
        }
        (self.completed as f64 / self.queued as f64).min(1.0)
    }
}

/// Running counts shared by the dispatcher's tasks.
#[derive(Debug)]
pub struct ProgressTally {
    started: Instant,
    queued: u64,
    already_done: u64,
    skipped_failed: u64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
}

impl ProgressTally {
    /// `already_done` and `skipped_failed` come from reconciliation and do not
    /// change during the run.
    pub fn new(queued: usize, already_done: usize, skipped_failed: usize) -> Self {
        Self {
            started: Instant::now(),
            queued: queued as u64,
            already_done: already_done as u64,
            skipped_failed: skipped_failed as u64,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    pub fn record_success(&self, bytes: u64) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn stats(&self) -> ProgressStats {
        let succeeded = self.succeeded.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        ProgressStats {
            completed: succeeded + failed,
            queued: self.queued,
            succeeded,
            failed,
            bytes: self.bytes.load(Ordering::SeqCst),
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        }
    }

    pub fn summary(&self) -> RunSummary {
        let s = self.stats();
        RunSummary {
            already_done: self.already_done,
            succeeded: s.succeeded,
            failed: s.failed,
            skipped_failed: self.skipped_failed,
            bytes: s.bytes,
            elapsed_secs: s.elapsed_secs,
        }
    }
}

/// Final counts for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Satisfied before this run started.
    pub already_done: u64,
    /// Downloaded this run.
    pub succeeded: u64,
    /// Failed this run.
    pub failed: u64,
    /// Left `Failed` because retry was not requested.
    pub skipped_failed: u64,
    pub bytes: u64,
    pub elapsed_secs: f64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Already archived:   {}", self.already_done)?;
        writeln!(f, "Downloaded now:     {} ({})", self.succeeded, format_bytes(self.bytes))?;
        writeln!(f, "Failed now:         {}", self.failed)?;
        write!(f, "Failed, not retried: {}", self.skipped_failed)?;
        if self.skipped_failed > 0 {
            write!(f, " (run again with --retry)")?;
        }
        Ok(())
    }
}

/// Human-readable byte count (binary units).
pub fn format_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
