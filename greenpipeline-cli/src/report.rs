use std::fmt::Write;

use crate::{
    core::result::MeasurementResult,
    fmt::{FormattedPercentage, OrNotAvailable},
    prelude::*,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Format {
    /// Human-readable block for the terminal.
    Text,

    /// The complete result as pretty-printed JSON.
    Json,

    /// Table for pull request comments.
    Markdown,
}

pub fn render(result: &MeasurementResult, format: Format) -> Result<String> {
    match format {
        Format::Text => render_text(result),
        Format::Json => {
            serde_json::to_string_pretty(result).context("failed to serialize the result")
        }
        Format::Markdown => render_markdown(result),
    }
}

fn render_text(result: &MeasurementResult) -> Result<String> {
    let mut text = String::new();
    writeln!(text, "GreenPipeline report")?;
    writeln!(text, "  Command:    {}", result.command)?;
    writeln!(text, "  Status:     {} (exit code {})", result.outcome, result.outcome.exit_code())?;
    writeln!(text, "  Duration:   {}", result.duration)?;
    match (result.energy, result.strategy) {
        (Some(energy), Some(strategy)) => writeln!(
            text,
            "  Energy:     {energy} ({:.6} kWh, {strategy})",
            energy.to_kilowatt_hours(),
        )?,
        _ => writeln!(text, "  Energy:     n/a")?,
    }
    writeln!(text, "  Emissions:  {}", OrNotAvailable(result.emissions()))?;
    writeln!(
        text,
        "  SCI Score:  {} per {}",
        OrNotAvailable(result.sci.map(|sci| sci.score)),
        result.functional_unit,
    )?;
    match &result.intensity {
        Some(record) => writeln!(
            text,
            "  Location:   {} ({}, {})",
            record.location, record.intensity, record.source,
        )?,
        None => writeln!(text, "  Location:   {} (intensity n/a)", result.location)?,
    }
    if let Some(utilization) = result.utilization {
        writeln!(
            text,
            "  Resources:  CPU {}, RAM {:.2} GiB",
            FormattedPercentage(utilization.cpu),
            utilization.memory_gibibytes(),
        )?;
    }
    if let Some(charges) = result.smartphone_charges() {
        writeln!(text, "  Equivalent to {charges:.2} smartphone charges")?;
    }
    if let Some(kilometres) = result.kilometres_driven() {
        writeln!(text, "  Equivalent to {kilometres:.4} km driven by car")?;
    }
    if result.measurement_incomplete {
        writeln!(text, "  Measurement incomplete:")?;
        for issue in &result.issues {
            writeln!(text, "    - {issue}")?;
        }
    }
    Ok(text)
}

fn render_markdown(result: &MeasurementResult) -> Result<String> {
    let mut text = String::new();
    writeln!(text, "### GreenPipeline report")?;
    writeln!(text)?;
    writeln!(text, "| Metric | Value |")?;
    writeln!(text, "|:--|--:|")?;
    writeln!(text, "| Command | `{}` |", result.command.replace('|', "\\|"))?;
    writeln!(text, "| Status | {} |", result.outcome)?;
    writeln!(text, "| Duration | {} |", result.duration)?;
    writeln!(text, "| Energy | {} |", OrNotAvailable(result.energy))?;
    writeln!(text, "| Emissions | {} |", OrNotAvailable(result.emissions()))?;
    writeln!(
        text,
        "| SCI Score | {} per {} |",
        OrNotAvailable(result.sci.map(|sci| sci.score)),
        result.functional_unit,
    )?;
    writeln!(
        text,
        "| Location | {} ({}) |",
        result.location,
        OrNotAvailable(result.intensity.as_ref().map(|record| record.intensity)),
    )?;
    if let Some(charges) = result.smartphone_charges() {
        writeln!(text, "| Smartphone charges | {charges:.2} |")?;
    }
    if let Some(kilometres) = result.kilometres_driven() {
        writeln!(text, "| Kilometres driven | {kilometres:.4} |")?;
    }
    if result.measurement_incomplete {
        writeln!(text)?;
        writeln!(text, "> **Measurement incomplete**")?;
        for issue in &result.issues {
            writeln!(text, "> - {issue}")?;
        }
    }
    Ok(text)
}
