//! CLI for the hoard media archiver.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hoard_core::config;
use std::path::PathBuf;

use commands::{run_archive, run_reset, run_status};

/// Top-level CLI for hoard.
#[derive(Debug, Parser)]
#[command(name = "hoard")]
#[command(about = "hoard: resumable archiver for remote photo and video libraries", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download everything not yet archived.
    Run {
        /// Also retry items that failed in earlier runs.
        #[arg(long)]
        retry: bool,
        /// Catalog manifest (JSON) used to create the ledger on the first run.
        #[arg(long, value_name = "MANIFEST")]
        catalog: Option<PathBuf>,
        /// Output directory (overrides `output_dir` in the config).
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
        /// Maximum concurrent transfers (overrides `concurrency` in the config).
        #[arg(long, value_name = "K")]
        jobs: Option<usize>,
    },

    /// Show ledger counts without touching the network.
    Status,

    /// Delete the ledger and the output directory.
    Reset {
        /// Do not ask for confirmation.
        #[arg(long)]
        yes: bool,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run {
                retry,
                catalog,
                output_dir,
                jobs,
            } => {
                if let Some(dir) = output_dir {
                    cfg.output_dir = dir;
                }
                if let Some(k) = jobs {
                    cfg.concurrency = k.max(1);
                }
                run_archive(&cfg, retry, catalog.as_deref()).await?;
            }
            CliCommand::Status => run_status(&cfg)?,
            CliCommand::Reset { yes } => run_reset(&cfg, yes)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
