use std::path::PathBuf;

use clap::Parser;

use crate::{
    history::{History, Totals},
    prelude::*,
    tables::build_history_table,
};

#[derive(Parser)]
pub struct HistoryArgs {
    #[clap(
        long = "history-path",
        env = "GREENPIPELINE_HISTORY_PATH",
        default_value = History::DEFAULT_PATH
    )]
    path: PathBuf,
}

impl HistoryArgs {
    pub fn open(&self) -> History {
        History::new(&self.path)
    }
}

#[derive(Parser)]
pub struct HistoryCommandArgs {
    #[clap(flatten)]
    history: HistoryArgs,

    /// Number of the most recent entries to show.
    #[clap(short = 'n', long, env = "GREENPIPELINE_HISTORY_LIMIT", default_value = "10")]
    limit: usize,
}

impl HistoryCommandArgs {
    #[instrument(skip_all)]
    pub fn run(self) -> Result {
        let history = self.history.open();
        let results = history.read_all()?;
        if results.is_empty() {
            println!("No measurements yet.");
            return Ok(());
        }
        let totals = results.iter().collect::<Totals>();
        let recent = &results[results.len().saturating_sub(self.limit)..];
        info!(path = %history.path().display(), n_entries = results.len(), "loaded");
        println!("{}", build_history_table(recent, totals));
        Ok(())
    }
}
