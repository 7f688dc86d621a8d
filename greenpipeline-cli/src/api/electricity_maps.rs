use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use greenpipeline_quantities::intensity::CarbonIntensity;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::{
    core::{
        error::MeasurementError,
        intensity::{CarbonIntensityProvider, CarbonIntensityRecord, IntensitySource},
        location::Location,
    },
    prelude::*,
};

/// [Electricity Maps](https://www.electricitymaps.com) real-time carbon intensity.
pub struct Api {
    client: reqwest::Client,
    endpoint: Url,
    token: Option<String>,

    /// Records are kept for the process lifetime.
    cache: RwLock<HashMap<Location, CarbonIntensityRecord>>,
}

impl Api {
    pub const DEFAULT_URL: &'static str = "https://api.electricitymap.org/v3/";

    pub fn new(base_url: &Url, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        let endpoint = base_url
            .join("carbon-intensity/latest")
            .with_context(|| format!("invalid Electricity Maps URL: `{base_url}`"))?;
        Ok(Self { client, endpoint, token, cache: RwLock::default() })
    }

    #[instrument(skip_all, fields(location = %location))]
    async fn fetch(&self, location: &Location) -> Result<CarbonIntensityRecord, MeasurementError> {
        info!("fetching the carbon intensity…");
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("zone", location.as_str());
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.header("auth-token", token);
        }
        let unavailable =
            |source| MeasurementError::ProviderUnavailable { location: location.clone(), source };

        let response = request.send().await.map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(MeasurementError::LocationNotFound(location.clone()));
        }
        let body: Response =
            response.error_for_status().map_err(unavailable)?.json().await.map_err(unavailable)?;
        info!(zone = %body.zone, intensity = body.carbon_intensity, body.is_estimated, "fetched");

        CarbonIntensityRecord::try_new(
            location.clone(),
            CarbonIntensity::from(body.carbon_intensity),
            IntensitySource::Live { estimated: body.is_estimated },
        )
    }
}

#[async_trait]
impl CarbonIntensityProvider for Api {
    async fn lookup(
        &self,
        location: &Location,
    ) -> Result<CarbonIntensityRecord, MeasurementError> {
        if let Some(record) = self.cache.read().await.get(location) {
            debug!(%location, "cache hit");
            return Ok(record.clone());
        }
        let record = self.fetch(location).await?;
        self.cache.write().await.insert(location.clone(), record.clone());
        Ok(record)
    }
}

#[derive(Deserialize)]
struct Response {
    zone: String,

    #[serde(rename = "carbonIntensity")]
    carbon_intensity: f64,

    #[serde(default, rename = "isEstimated")]
    is_estimated: bool,
}
