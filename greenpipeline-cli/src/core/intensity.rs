pub mod table;

use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use greenpipeline_quantities::intensity::CarbonIntensity;
use serde::{Deserialize, Serialize};

use crate::{
    core::{error::MeasurementError, location::Location},
    prelude::*,
};

/// Resolves grid locations into carbon intensities.
///
/// Implementations are shared between concurrent sessions and must not hold mutable state
/// other than a lookup cache.
#[async_trait]
pub trait CarbonIntensityProvider: Send + Sync {
    async fn lookup(&self, location: &Location)
    -> Result<CarbonIntensityRecord, MeasurementError>;
}

/// Look the location up, substituting `fallback` for an unknown location when configured.
pub async fn lookup_or_fallback(
    provider: &dyn CarbonIntensityProvider,
    location: &Location,
    fallback: Option<CarbonIntensity>,
) -> Result<CarbonIntensityRecord, MeasurementError> {
    match provider.lookup(location).await {
        Err(MeasurementError::LocationNotFound(location)) => {
            let Some(intensity) = fallback else {
                return Err(MeasurementError::LocationNotFound(location));
            };
            warn!(%location, ?intensity, "unknown location, using the fallback intensity");
            CarbonIntensityRecord::try_new(location, intensity, IntensitySource::Fallback)
        }
        result => result,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarbonIntensityRecord {
    pub location: Location,
    pub intensity: CarbonIntensity,
    pub source: IntensitySource,
}

impl CarbonIntensityRecord {
    pub fn try_new(
        location: Location,
        intensity: CarbonIntensity,
        source: IntensitySource,
    ) -> Result<Self, MeasurementError> {
        if !intensity.is_physical() {
            return Err(MeasurementError::InvalidIntensity { location, value: intensity.0.0 });
        }
        Ok(Self { location, intensity, source })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntensitySource {
    /// Annual grid average from the static table.
    Table,

    /// Real-time value from a remote provider.
    Live { estimated: bool },

    /// Configured substitute for an unknown location.
    Fallback,
}

impl Display for IntensitySource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "annual average"),
            Self::Live { estimated: false } => write!(f, "live"),
            Self::Live { estimated: true } => write!(f, "live, estimated"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}
