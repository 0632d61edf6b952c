//! `hoard reset` – delete the ledger and all downloaded media.

use anyhow::Result;
use hoard_core::archive;
use hoard_core::config::HoardConfig;
use std::io::{BufRead, Write};

pub fn run_reset(cfg: &HoardConfig, yes: bool) -> Result<()> {
    let ledger_path = cfg.resolved_ledger_path()?;
    if !yes {
        print!(
            "Delete {} and everything under {}? [y/N] ",
            ledger_path.display(),
            cfg.output_dir.display()
        );
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        if !confirmed(&answer) {
            println!("Aborted.");
            return Ok(());
        }
    }

    let removed = archive::reset(&ledger_path, &cfg.output_dir)?;
    match (removed.removed_ledger, removed.removed_output) {
        (false, false) => println!("Nothing to reset."),
        _ => println!("Reset complete."),
    }
    Ok(())
}

fn confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
