pub mod counter;
pub mod model;
pub mod sampler;

use std::time::Duration;

use chrono::{DateTime, Local};
use greenpipeline_quantities::energy::Joules;
use serde::{Deserialize, Serialize};

use crate::core::{
    error::MeasurementError,
    estimator::{
        counter::{CounterEstimator, CounterMeasurement},
        model::{ModelEstimator, ModelMeasurement, Utilization},
    },
};

#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Poll the hardware energy counter (RAPL).
    #[display("counter")]
    Counter,

    /// Estimate from CPU and memory utilization.
    #[display("model")]
    Model,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct EnergySample {
    pub timestamp: DateTime<Local>,

    /// Cumulative energy.
    pub energy: Joules,
}

/// Output of either strategy.
#[derive(Clone, Debug)]
pub struct EnergyReading {
    pub strategy: Strategy,
    pub total: Joules,

    /// Counter samples; the model strategy does not produce any.
    pub samples: Vec<EnergySample>,

    /// Mean utilization, only known to the model strategy.
    pub utilization: Option<Utilization>,
}

pub enum Estimator {
    Counter(CounterEstimator),
    Model(ModelEstimator),
}

impl Estimator {
    pub const fn strategy(&self) -> Strategy {
        match self {
            Self::Counter(_) => Strategy::Counter,
            Self::Model(_) => Strategy::Model,
        }
    }

    /// Capture the baseline and start the background sampling.
    pub fn start(self, period: Duration) -> Result<RunningEstimate, MeasurementError> {
        match self {
            Self::Counter(estimator) => Ok(RunningEstimate::Counter(estimator.start(period)?)),
            Self::Model(estimator) => Ok(RunningEstimate::Model(estimator.start(period))),
        }
    }
}

/// Handle to an estimate in progress.
pub enum RunningEstimate {
    Counter(CounterMeasurement),
    Model(ModelMeasurement),
}

impl RunningEstimate {
    /// Join the sampling task and take the final reading.
    ///
    /// A reading whose total is negative or not finite is reported as unavailable.
    pub async fn stop(self) -> Result<EnergyReading, MeasurementError> {
        let reading = match self {
            Self::Counter(measurement) => measurement.stop().await?,
            Self::Model(measurement) => measurement.stop().await?,
        };
        if !reading.total.is_physical() {
            return Err(MeasurementError::unavailable(format!(
                "the {} strategy produced an invalid total of {:?}",
                reading.strategy, reading.total,
            )));
        }
        Ok(reading)
    }
}
