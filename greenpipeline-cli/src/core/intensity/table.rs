use std::{collections::HashMap, fs, path::Path};

use async_trait::async_trait;
use greenpipeline_quantities::intensity::CarbonIntensity;
use serde::Deserialize;

use crate::{
    core::{
        error::MeasurementError,
        intensity::{CarbonIntensityProvider, CarbonIntensityRecord, IntensitySource},
        location::Location,
    },
    prelude::*,
};

/// Annual average grid intensities, g CO₂e/kWh.
const BUILTIN: &[(&str, f64)] = &[
    (Location::GLOBAL, 475.0),
    ("AU", 510.0),
    ("BR", 100.0),
    ("CA", 130.0),
    ("CN", 580.0),
    ("CO", 165.0),
    ("DE", 420.0),
    ("ES", 160.0),
    ("FR", 56.0),
    ("GB", 238.0),
    ("IN", 710.0),
    ("IT", 330.0),
    ("JP", 470.0),
    ("NL", 340.0),
    ("NO", 26.0),
    ("PL", 660.0),
    ("SE", 30.0),
    ("US", 389.0),
    ("US-CA", 210.0),
    ("ZA", 710.0),
];

/// In-memory table of carbon intensities, read-only after construction.
#[derive(Clone)]
pub struct StaticTable(HashMap<Location, CarbonIntensity>);

impl StaticTable {
    pub fn builtin() -> Self {
        BUILTIN
            .iter()
            .map(|(code, intensity)| {
                (Location::from_static(code), CarbonIntensity::from(*intensity))
            })
            .collect()
    }

    /// Extend or override the table from a TOML file with a `[zones]` table.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn with_overrides_from(mut self, path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read the intensity table `{}`", path.display()))?;
        let file: TableFile = toml::from_str(&contents)
            .with_context(|| format!("failed to parse the intensity table `{}`", path.display()))?;
        for (code, intensity) in file.zones {
            let location: Location = code.parse()?;
            let record = CarbonIntensityRecord::try_new(
                location,
                CarbonIntensity::from(intensity),
                IntensitySource::Table,
            )?;
            debug!(%record.location, ?record.intensity, "override");
            self.0.insert(record.location, record.intensity);
        }
        info!(len = self.0.len(), "loaded the intensity table");
        Ok(self)
    }
}

impl FromIterator<(Location, CarbonIntensity)> for StaticTable {
    fn from_iter<T: IntoIterator<Item = (Location, CarbonIntensity)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[async_trait]
impl CarbonIntensityProvider for StaticTable {
    async fn lookup(
        &self,
        location: &Location,
    ) -> Result<CarbonIntensityRecord, MeasurementError> {
        let intensity = self
            .0
            .get(location)
            .copied()
            .ok_or_else(|| MeasurementError::LocationNotFound(location.clone()))?;
        CarbonIntensityRecord::try_new(location.clone(), intensity, IntensitySource::Table)
    }
}

#[derive(Deserialize)]
struct TableFile {
    #[serde(default)]
    zones: HashMap<String, f64>,
}
