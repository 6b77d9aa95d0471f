// src/lib.rs

pub mod args;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod runner;

use anyhow::{Context, Result};
use tracing::debug;

use crate::cli::CliArgs;
use crate::config::load_and_validate;

pub use crate::args::{Arg, FlagValue, expand_args};
pub use crate::exec::{Completion, ExitValue};
pub use crate::pipeline::{Destination, NO_ARGS, NodeState, Pipeline, StreamSelector, command};

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the pipeline file, then either prints it
/// (`--dry-run`) or runs it into its sink. Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading pipeline file {:?}", args.config))?;

    if args.dry_run {
        print!("{}", runner::describe(&cfg));
        debug!("dry-run complete (no execution)");
        return Ok(0);
    }

    let exit = runner::execute(&cfg).await?;
    Ok(runner::exit_code(&exit))
}
