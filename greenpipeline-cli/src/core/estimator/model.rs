use std::time::{Duration, Instant};

use greenpipeline_quantities::{power::Watts, time::Seconds};
use serde::{Deserialize, Serialize};

use crate::{
    core::{
        error::MeasurementError,
        estimator::{
            EnergyReading,
            Strategy,
            sampler::{Probe, Sampler, Samples},
        },
    },
    prelude::*,
};

/// Source of host utilization readings.
pub trait UtilizationSource: Send + 'static {
    fn sample(&mut self) -> Result<Utilization>;

    /// Shortest polling period that still yields meaningful readings.
    fn min_period(&self) -> Duration {
        Duration::ZERO
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Utilization {
    /// CPU utilization, `0..=1`.
    pub cpu: f64,

    pub memory_bytes: u64,
}

impl Utilization {
    #[expect(clippy::cast_precision_loss)]
    pub fn memory_gibibytes(self) -> f64 {
        self.memory_bytes as f64 / f64::from(1 << 30)
    }

    #[expect(clippy::cast_precision_loss)]
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn mean(samples: &[Self]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let cpu = samples.iter().map(|sample| sample.cpu).sum::<f64>() / n;
        let memory_bytes =
            samples.iter().map(|sample| sample.memory_bytes as f64).sum::<f64>() / n;
        Some(Self { cpu, memory_bytes: memory_bytes.round() as u64 })
    }
}

/// Linear power model over CPU utilization with an idle baseline, plus memory.
#[derive(Copy, Clone, Debug)]
pub struct PowerModel {
    pub thermal_design_power: Watts,
}

impl PowerModel {
    const CPU_FACTOR: f64 = 0.6;
    const CPU_BASELINE: f64 = 0.4;
    const WATTS_PER_GIBIBYTE: f64 = 0.375;

    pub fn for_architecture(architecture: &str) -> Self {
        let thermal_design_power = match architecture {
            "aarch64" | "arm64" => Watts::from(15),
            _ => Watts::from(65),
        };
        Self { thermal_design_power }
    }

    pub fn host() -> Self {
        Self::for_architecture(std::env::consts::ARCH)
    }

    pub fn power(self, utilization: Utilization) -> Watts {
        let cpu = utilization.cpu.clamp(0.0, 1.0);
        let cpu_power =
            self.thermal_design_power * cpu.mul_add(Self::CPU_FACTOR, Self::CPU_BASELINE);
        let memory_power =
            Watts::from(utilization.memory_gibibytes() * Self::WATTS_PER_GIBIBYTE);
        cpu_power + memory_power
    }
}

struct UtilizationProbe(Box<dyn UtilizationSource>);

impl Probe for UtilizationProbe {
    type Sample = Utilization;

    fn probe(&mut self) -> Result<Utilization> {
        let utilization = self.0.sample()?;
        ensure!(utilization.cpu.is_finite(), "invalid CPU utilization: {}", utilization.cpu);
        Ok(utilization)
    }
}

pub struct ModelEstimator {
    model: PowerModel,
    source: Box<dyn UtilizationSource>,
}

impl ModelEstimator {
    pub fn new(model: PowerModel, source: impl UtilizationSource) -> Self {
        Self { model, source: Box::new(source) }
    }

    pub fn start(self, period: Duration) -> ModelMeasurement {
        let period = period.max(self.source.min_period());
        debug!(?period, thermal_design_power = ?self.model.thermal_design_power, "starting…");
        ModelMeasurement {
            model: self.model,
            started_at: Instant::now(),
            sampler: Sampler::spawn(UtilizationProbe(self.source), Vec::new(), period),
        }
    }
}

pub struct ModelMeasurement {
    model: PowerModel,
    started_at: Instant,
    sampler: Sampler<UtilizationProbe>,
}

impl ModelMeasurement {
    #[instrument(skip_all)]
    pub async fn stop(self) -> Result<EnergyReading, MeasurementError> {
        let Samples { mut probe, mut samples, mut n_failures } = self.sampler.join().await?;
        let duration = Seconds::from(self.started_at.elapsed());
        match probe.probe() {
            Ok(sample) => samples.push(sample),
            Err(error) => {
                n_failures += 1;
                warn!("failed to take the final utilization sample: {error:#}");
            }
        }

        let utilization = Utilization::mean(&samples).ok_or_else(|| {
            MeasurementError::unavailable(format!(
                "no utilization samples, {n_failures} polls failed",
            ))
        })?;
        let power = self.model.power(utilization);
        let total = power * duration;
        info!(?power, ?duration, ?total, n_samples = samples.len(), n_failures, "estimated");
        Ok(EnergyReading {
            strategy: Strategy::Model,
            total,
            samples: Vec::new(),
            utilization: Some(utilization),
        })
    }
}
