use std::{fs, path::PathBuf};

use clap::Parser;

use crate::{
    cli::{history::HistoryArgs, interrupted, measurement::MeasurementArgs},
    core::result::MeasurementResult,
    prelude::*,
    report::{Format, render},
};

#[derive(Parser)]
pub struct RunArgs {
    #[clap(flatten)]
    pub(super) measurement: MeasurementArgs,

    #[clap(long, env = "GREENPIPELINE_FORMAT", default_value = "text")]
    format: Format,

    /// Also write the report into this file.
    #[clap(long, env = "GREENPIPELINE_OUTPUT")]
    output: Option<PathBuf>,

    #[clap(flatten)]
    history: HistoryArgs,

    /// Do not append the result to the history.
    #[clap(long, env = "GREENPIPELINE_NO_HISTORY")]
    no_history: bool,

    /// Command to measure, executed with `sh -c`.
    #[clap(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub(super) command: Vec<String>,
}

impl RunArgs {
    /// Measure the command and return its exit code.
    ///
    /// Reporting problems are logged and never change the exit code.
    #[instrument(skip_all)]
    pub async fn run(self) -> Result<u8> {
        let provider = self.measurement.provider.build_or_unconfigured();
        let config = self.measurement.config(self.measurement.location.clone())?;
        let result =
            self.measurement.session(&self.command, config, provider).measure(interrupted()).await?;

        if let Err(error) = self.report(&result) {
            warn!("failed to report: {error:#}");
        }
        if !self.no_history
            && let Err(error) = self.history.open().append(&result)
        {
            warn!("failed to update the history: {error:#}");
        }
        Ok(result.outcome.exit_code())
    }

    fn report(&self, result: &MeasurementResult) -> Result {
        let report = render(result, self.format)?;
        print!("{report}");
        if let Some(path) = &self.output {
            fs::write(path, &report)
                .with_context(|| format!("failed to write `{}`", path.display()))?;
            info!(path = %path.display(), "written");
        }
        Ok(())
    }
}
