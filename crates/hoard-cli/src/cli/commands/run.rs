//! `hoard run` – reconcile the ledger and download what is missing.

use anyhow::Result;
use hoard_core::archive::{self, RunOptions};
use hoard_core::auth::StaticCredentials;
use hoard_core::catalog::{Catalog, ManifestCatalog};
use hoard_core::config::HoardConfig;
use hoard_core::fetch::CurlTransport;
use hoard_core::progress::{format_bytes, ProgressStats};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

pub async fn run_archive(cfg: &HoardConfig, retry: bool, catalog: Option<&Path>) -> Result<()> {
    let manifest = catalog.map(ManifestCatalog::new);
    let credentials = Arc::new(StaticCredentials::from_config(cfg.auth.as_ref()));
    let transport = Arc::new(CurlTransport::new(credentials, cfg.transfer.clone()));

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel::<ProgressStats>(64);
    const PROGRESS_INTERVAL_MS: u64 = 500;
    let progress_handle = tokio::spawn(async move {
        let mut last_print = Instant::now();
        let mut printed = false;
        while let Some(stats) = progress_rx.recv().await {
            let now = Instant::now();
            if now.duration_since(last_print).as_millis() as u64 >= PROGRESS_INTERVAL_MS
                || stats.completed >= stats.queued
            {
                let eta = stats
                    .eta_secs()
                    .map(|s| format!("{:.0}s", s))
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "  {} / {} ({:.1}%)  {} ok, {} failed  {:.1} items/s  {}  ETA {}",
                    stats.completed,
                    stats.queued,
                    stats.fraction() * 100.0,
                    stats.succeeded,
                    stats.failed,
                    stats.items_per_sec(),
                    format_bytes(stats.bytes),
                    eta
                );
                last_print = now;
                printed = true;
            }
        }
        if printed {
            println!();
        }
    });

    let result = archive::run(
        cfg,
        RunOptions {
            catalog: manifest.as_ref().map(|m| m as &dyn Catalog),
            retry_failed: retry,
            transport,
            progress_tx: Some(progress_tx),
        },
    )
    .await;
    // The sender was moved into the run; it is dropped by now, so this ends.
    let _ = progress_handle.await;

    let report = result?;
    if report.seeded {
        println!("Created ledger with {} items at {}", report.counts.total(), report.ledger_path.display());
    }
    if report.reconciliation.queue.is_empty() {
        println!("Nothing to download.");
    }
    println!("{}", report.summary);
    if report.checkpoint_failures > 0 {
        println!(
            "warning: {} checkpoint(s) could not be written{}",
            report.checkpoint_failures,
            if report.durable {
                ""
            } else {
                "; the ledger on disk is behind, completed files will be re-checked next run"
            }
        );
    }
    tracing::info!(
        done = report.counts.done,
        failed = report.counts.failed,
        "archive run complete"
    );
    Ok(())
}
