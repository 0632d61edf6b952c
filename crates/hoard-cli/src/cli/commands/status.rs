//! `hoard status` – counts from the ledger snapshot.

use anyhow::Result;
use hoard_core::archive;
use hoard_core::config::HoardConfig;

pub fn run_status(cfg: &HoardConfig) -> Result<()> {
    let ledger_path = cfg.resolved_ledger_path()?;
    match archive::status(&ledger_path)? {
        None => println!("No ledger yet. Run `hoard run --catalog <manifest>` first."),
        Some(c) => {
            println!("{:<10} {}", "succeeded", c.done);
            println!("{:<10} {}", "failed", c.failed);
            println!("{:<10} {}", "fetching", c.in_progress);
            println!("{:<10} {}", "waiting", c.pending);
            println!("{:<10} {}", "total", c.total());
        }
    }
    Ok(())
}
