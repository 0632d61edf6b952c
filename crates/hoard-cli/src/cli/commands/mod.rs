//! CLI command handlers, one file per subcommand.

mod reset;
mod run;
mod status;

pub use reset::run_reset;
pub use run::run_archive;
pub use status::run_status;
