use bon::Builder;
use chrono::{DateTime, Local};
use greenpipeline_quantities::{Quantity, energy::Joules, mass::Grams, time::Seconds};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::core::{
    command::CommandOutcome,
    estimator::{Strategy, model::Utilization},
    intensity::CarbonIntensityRecord,
    location::Location,
    sci::SciScore,
};

/// Immutable outcome of one measured run.
///
/// Missing values mean they could not be measured, in which case `measurement_incomplete`
/// is raised and `issues` explain why.
#[derive(Clone, Debug, Builder, Serialize, Deserialize)]
pub struct MeasurementResult {
    #[builder(into)]
    pub command: String,

    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub duration: Seconds,
    pub outcome: CommandOutcome,
    pub location: Location,

    #[builder(into)]
    pub functional_unit: String,

    pub strategy: Option<Strategy>,
    pub energy: Option<Joules>,
    pub utilization: Option<Utilization>,
    pub intensity: Option<CarbonIntensityRecord>,
    pub sci: Option<SciScore>,

    #[builder(default)]
    pub measurement_incomplete: bool,

    #[builder(default)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

impl MeasurementResult {
    /// Energy to fully charge a typical smartphone, 0.0124 kWh.
    pub const SMARTPHONE_CHARGE: Joules = Quantity(OrderedFloat(44_640.0));

    /// Average passenger car emissions per kilometre.
    pub const CAR_EMISSIONS_PER_KILOMETRE: Grams = Quantity(OrderedFloat(192.0));

    #[must_use]
    pub fn emissions(&self) -> Option<Grams> {
        self.sci.map(|sci| sci.emissions)
    }

    #[must_use]
    pub fn smartphone_charges(&self) -> Option<f64> {
        self.energy.map(|energy| (energy / Self::SMARTPHONE_CHARGE).0)
    }

    #[must_use]
    pub fn kilometres_driven(&self) -> Option<f64> {
        self.emissions().map(|emissions| (emissions / Self::CAR_EMISSIONS_PER_KILOMETRE).0)
    }
}
