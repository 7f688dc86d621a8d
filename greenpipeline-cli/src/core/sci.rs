use greenpipeline_quantities::{energy::Joules, intensity::CarbonIntensity, mass::Grams};
use serde::{Deserialize, Serialize};

use crate::core::error::MeasurementError;

/// Software Carbon Intensity: `SCI = ((E × I) + M) / R`.
#[derive(Copy, Clone, Debug)]
pub struct SciCalculator {
    /// Embodied emissions `M` attributed to the measurement window.
    pub embodied_overhead: Grams,
}

impl Default for SciCalculator {
    fn default() -> Self {
        Self { embodied_overhead: Grams::ZERO }
    }
}

impl SciCalculator {
    pub fn compute(
        self,
        energy: Joules,
        intensity: CarbonIntensity,
        functional_unit_count: u32,
    ) -> Result<SciScore, MeasurementError> {
        if functional_unit_count == 0 {
            return Err(MeasurementError::InvalidFunctionalUnit(functional_unit_count));
        }
        let emissions = energy * intensity;
        let score = (emissions + self.embodied_overhead) / f64::from(functional_unit_count);
        Ok(SciScore {
            emissions,
            embodied_overhead: self.embodied_overhead,
            functional_unit_count,
            score,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SciScore {
    /// Operational emissions, `E × I`.
    pub emissions: Grams,

    pub embodied_overhead: Grams,
    pub functional_unit_count: u32,

    /// Emissions per functional unit.
    pub score: Grams,
}
