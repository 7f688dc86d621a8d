pub mod compare;
mod history;
mod measurement;
mod provider;
mod run;

use std::future::pending;

use clap::{Parser, Subcommand};

pub use self::{compare::CompareArgs, history::HistoryCommandArgs, run::RunArgs};
use crate::prelude::*;

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: run the command, measure its footprint, and print the report.
    #[clap(name = "run")]
    Run(Box<RunArgs>),

    /// Measure the command once and compare its emissions across grid locations.
    #[clap(name = "compare")]
    Compare(Box<CompareArgs>),

    /// Show the recent measurements.
    #[clap(name = "history")]
    History(Box<HistoryCommandArgs>),
}

/// Resolve on Ctrl-C.
///
/// Never resolves if the signal handler cannot be installed.
async fn interrupted() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl-C: {error}");
        pending::<()>().await;
    }
    warn!("interrupted");
}
