use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    cli::compare::Comparison,
    core::result::MeasurementResult,
    fmt::{FormattedDifference, OrNotAvailable},
    history::Totals,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table
}

pub fn build_history_table(results: &[MeasurementResult], totals: Totals) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        "Date", "Time", "Command", "Status", "Location", "Duration", "Energy", "Emissions",
    ]);
    for result in results {
        table.add_row(vec![
            Cell::new(result.finished_at.format("%b %d")).add_attribute(Attribute::Dim),
            Cell::new(result.finished_at.format("%H:%M:%S")),
            Cell::new(&result.command),
            Cell::new(result.outcome).fg(if result.outcome.is_success() {
                Color::Green
            } else {
                Color::Red
            }),
            Cell::new(&result.location),
            Cell::new(result.duration).set_alignment(CellAlignment::Right),
            Cell::new(OrNotAvailable(result.energy)).set_alignment(CellAlignment::Right),
            Cell::new(OrNotAvailable(result.emissions()))
                .set_alignment(CellAlignment::Right)
                .fg(if result.measurement_incomplete { Color::DarkYellow } else { Color::Reset }),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        Cell::new(""),
        Cell::new(format!(
            "{} runs, {} incomplete, {:.2} smartphone charges",
            totals.n_runs,
            totals.n_incomplete,
            totals.smartphone_charges(),
        ))
        .add_attribute(Attribute::Dim),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(totals.energy).set_alignment(CellAlignment::Right).add_attribute(Attribute::Bold),
        Cell::new(totals.emissions)
            .set_alignment(CellAlignment::Right)
            .add_attribute(Attribute::Bold),
    ]);
    table
}

pub fn build_comparison_table(comparisons: &[Comparison]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Location", "Intensity", "Source", "Emissions", "SCI", "Difference"]);
    for (index, comparison) in comparisons.iter().enumerate() {
        let difference = match comparison.difference {
            _ if index == 0 => Cell::new("baseline").add_attribute(Attribute::Dim),
            Some(difference) => Cell::new(FormattedDifference(difference))
                .fg(if difference > 0.0 { Color::Red } else { Color::Green }),
            None => Cell::new("n/a").add_attribute(Attribute::Dim),
        };
        table.add_row(vec![
            Cell::new(&comparison.record.location).add_attribute(Attribute::Bold),
            Cell::new(comparison.record.intensity).set_alignment(CellAlignment::Right),
            Cell::new(comparison.record.source).add_attribute(Attribute::Dim),
            Cell::new(comparison.sci.emissions).set_alignment(CellAlignment::Right),
            Cell::new(comparison.sci.score).set_alignment(CellAlignment::Right),
            difference.set_alignment(CellAlignment::Right),
        ]);
    }
    table
}
