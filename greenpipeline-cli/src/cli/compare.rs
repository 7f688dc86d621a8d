use clap::Parser;
use greenpipeline_quantities::energy::Joules;

use crate::{
    cli::{interrupted, measurement::MeasurementArgs},
    core::{
        intensity::{CarbonIntensityRecord, lookup_or_fallback},
        location::Location,
        sci::{SciCalculator, SciScore},
    },
    prelude::*,
    report::{Format, render},
    tables::build_comparison_table,
};

#[derive(Parser)]
pub struct CompareArgs {
    #[clap(flatten)]
    measurement: MeasurementArgs,

    /// Locations to compare, the first one is the baseline and is used for the report.
    #[clap(
        long,
        env = "GREENPIPELINE_COMPARE_LOCATIONS",
        value_delimiter = ',',
        default_value = "CO,DE,US-CA,FR"
    )]
    locations: Vec<Location>,

    /// Command to measure, executed with `sh -c`.
    #[clap(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl CompareArgs {
    #[instrument(skip_all)]
    pub async fn run(self) -> Result<u8> {
        let Some(baseline) = self.locations.first() else {
            bail!("at least one location is required");
        };
        let provider = self.measurement.provider.build_or_unconfigured();
        let config = self.measurement.config(baseline.clone())?;
        let result = self
            .measurement
            .session(&self.command, config.clone(), provider.clone())
            .measure(interrupted())
            .await?;
        print!("{}", render(&result, Format::Text)?);

        let Some(energy) = result.energy else {
            warn!("the energy is unknown, nothing to compare");
            return Ok(result.outcome.exit_code());
        };
        let mut records = Vec::with_capacity(self.locations.len());
        for location in &self.locations {
            match lookup_or_fallback(provider.as_ref(), location, config.fallback_intensity).await {
                Ok(record) => records.push(record),
                Err(error) => warn!(%location, "skipping: {error}"),
            }
        }
        let comparisons =
            compare(energy, records, config.calculator, config.functional_unit_count)?;
        println!("{}", build_comparison_table(&comparisons));
        Ok(result.outcome.exit_code())
    }
}

pub struct Comparison {
    pub record: CarbonIntensityRecord,
    pub sci: SciScore,

    /// Relative to the first location, if that one has non-zero emissions.
    pub difference: Option<f64>,
}

fn compare(
    energy: Joules,
    records: Vec<CarbonIntensityRecord>,
    calculator: SciCalculator,
    functional_unit_count: u32,
) -> Result<Vec<Comparison>> {
    let mut baseline = None;
    let mut comparisons = Vec::with_capacity(records.len());
    for record in records {
        let sci = calculator.compute(energy, record.intensity, functional_unit_count)?;
        let baseline_score = *baseline.get_or_insert(sci.score);
        let difference = (baseline_score.0.0 > 0.0)
            .then(|| ((sci.score - baseline_score) / baseline_score).0);
        comparisons.push(Comparison { record, sci, difference });
    }
    Ok(comparisons)
}
