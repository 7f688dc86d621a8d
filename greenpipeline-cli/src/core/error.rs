use greenpipeline_quantities::mass::Grams;
use thiserror::Error;

use crate::core::{location::Location, session::SessionState};

#[derive(Debug, Error)]
pub enum MeasurementError {
    #[error("location code must not be empty")]
    InvalidLocation,

    #[error("no carbon intensity is known for location `{0}`")]
    LocationNotFound(Location),

    #[error("carbon intensity for `{location}` must be finite and non-negative, got {value}")]
    InvalidIntensity { location: Location, value: f64 },

    #[error("carbon intensity provider failed to resolve `{location}`")]
    ProviderUnavailable {
        location: Location,

        #[source]
        source: reqwest::Error,
    },

    #[error("carbon intensity provider is not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("energy measurement is unavailable: {0}")]
    MeasurementUnavailable(String),

    #[error("functional unit count must be positive, got {0}")]
    InvalidFunctionalUnit(u32),

    #[error("embodied overhead must be finite and non-negative, got {0:?}")]
    InvalidEmbodiedOverhead(Grams),

    #[error("sampling interval must be positive")]
    InvalidSamplingInterval,

    #[error("cannot {operation} a session in the `{state}` state")]
    InvalidSessionState { operation: &'static str, state: SessionState },
}

impl MeasurementError {
    pub(crate) fn unavailable(message: impl Into<String>) -> Self {
        Self::MeasurementUnavailable(message.into())
    }
}
