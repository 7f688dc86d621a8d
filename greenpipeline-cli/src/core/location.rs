use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::MeasurementError;

/// Grid location code, such as `DE` or `US-CA`.
#[derive(
    Clone,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(try_from = "String", into = "String")]
pub struct Location(String);

impl Location {
    /// Pseudo-zone for the worldwide grid average.
    pub const GLOBAL: &'static str = "GLOBAL";

    /// Build a location from a compile-time code, which is trusted to be non-empty.
    pub(crate) fn from_static(code: &'static str) -> Self {
        Self(code.to_uppercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Location {
    type Err = MeasurementError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let code = code.trim();
        if code.is_empty() {
            return Err(MeasurementError::InvalidLocation);
        }
        Ok(Self(code.to_uppercase()))
    }
}

impl TryFrom<String> for Location {
    type Error = MeasurementError;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        code.parse()
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.0
    }
}
