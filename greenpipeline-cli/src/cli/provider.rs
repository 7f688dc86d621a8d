use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use clap::Parser;
use reqwest::Url;

use crate::{
    api::electricity_maps,
    core::{
        error::MeasurementError,
        intensity::{CarbonIntensityProvider, CarbonIntensityRecord, table::StaticTable},
        location::Location,
    },
    prelude::*,
};

#[derive(Parser)]
pub struct ProviderArgs {
    #[clap(
        long = "intensity-provider",
        env = "GREENPIPELINE_INTENSITY_PROVIDER",
        default_value = "table"
    )]
    kind: ProviderKind,

    /// TOML file with a `[zones]` table overriding or extending the built-in intensities.
    #[clap(long = "intensity-table", env = "GREENPIPELINE_INTENSITY_TABLE")]
    table_path: Option<PathBuf>,

    #[clap(
        long = "electricity-maps-token",
        env = "ELECTRICITY_MAPS_TOKEN",
        hide_env_values = true
    )]
    electricity_maps_token: Option<String>,

    #[clap(
        long = "electricity-maps-url",
        env = "ELECTRICITY_MAPS_URL",
        default_value = electricity_maps::Api::DEFAULT_URL
    )]
    electricity_maps_url: Url,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProviderKind {
    /// Annual grid averages.
    Table,

    /// Real-time intensity from Electricity Maps.
    ElectricityMaps,
}

impl ProviderArgs {
    /// Build the provider, or one that fails every lookup, so that the command runs regardless.
    pub fn build_or_unconfigured(&self) -> Arc<dyn CarbonIntensityProvider> {
        self.build().unwrap_or_else(|error| {
            warn!("failed to set up the carbon intensity provider: {error:#}");
            Arc::new(Unconfigured(format!("{error:#}")))
        })
    }

    pub fn build(&self) -> Result<Arc<dyn CarbonIntensityProvider>> {
        match self.kind {
            ProviderKind::Table => {
                let table = StaticTable::builtin();
                let table = match &self.table_path {
                    Some(path) => table.with_overrides_from(path)?,
                    None => table,
                };
                Ok(Arc::new(table))
            }
            ProviderKind::ElectricityMaps => {
                if self.electricity_maps_token.is_none() {
                    warn!("no Electricity Maps token, requests are likely to be rejected");
                }
                let api = electricity_maps::Api::new(
                    &self.electricity_maps_url,
                    self.electricity_maps_token.clone(),
                )?;
                Ok(Arc::new(api))
            }
        }
    }
}

/// Provider that could not be built.
struct Unconfigured(String);

#[async_trait]
impl CarbonIntensityProvider for Unconfigured {
    async fn lookup(
        &self,
        _location: &Location,
    ) -> Result<CarbonIntensityRecord, MeasurementError> {
        Err(MeasurementError::ProviderNotConfigured(self.0.clone()))
    }
}
