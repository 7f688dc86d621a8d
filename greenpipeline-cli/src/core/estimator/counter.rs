use std::time::Duration;

use chrono::Local;
use greenpipeline_quantities::energy::Joules;

use crate::{
    core::{
        error::MeasurementError,
        estimator::{
            EnergyReading,
            EnergySample,
            Strategy,
            sampler::{Probe, Sampler, Samples},
        },
    },
    prelude::*,
};

/// Hardware or OS energy counter.
pub trait EnergyCounter: Send + 'static {
    /// Read the cumulative energy since an arbitrary origin.
    fn read(&mut self) -> Result<Joules>;
}

/// Samples the counter and rejects readings that go backwards.
struct CounterProbe {
    counter: Box<dyn EnergyCounter>,
    last: Option<Joules>,
}

impl Probe for CounterProbe {
    type Sample = EnergySample;

    fn probe(&mut self) -> Result<EnergySample> {
        let energy = self.counter.read()?;
        ensure!(energy.is_physical(), "invalid counter reading: {energy:?}");
        if let Some(last) = self.last {
            ensure!(energy >= last, "counter went backwards: {energy:?} < {last:?}");
        }
        self.last = Some(energy);
        Ok(EnergySample { timestamp: Local::now(), energy })
    }
}

pub struct CounterEstimator(Box<dyn EnergyCounter>);

impl CounterEstimator {
    pub fn new(counter: impl EnergyCounter) -> Self {
        Self(Box::new(counter))
    }

    /// Take the baseline reading and start polling.
    pub fn start(self, period: Duration) -> Result<CounterMeasurement, MeasurementError> {
        let mut probe = CounterProbe { counter: self.0, last: None };
        let baseline = probe.probe().map_err(|error| {
            MeasurementError::unavailable(format!("failed to read the energy counter: {error:#}"))
        })?;
        debug!(?baseline.energy, "baseline");
        Ok(CounterMeasurement(Sampler::spawn(probe, vec![baseline], period)))
    }
}

pub struct CounterMeasurement(Sampler<CounterProbe>);

impl CounterMeasurement {
    #[instrument(skip_all)]
    pub async fn stop(self) -> Result<EnergyReading, MeasurementError> {
        let Samples { mut probe, mut samples, mut n_failures } = self.0.join().await?;
        match probe.probe() {
            Ok(sample) => samples.push(sample),
            Err(error) => {
                n_failures += 1;
                warn!("failed to take the final reading: {error:#}");
            }
        }

        if samples.len() < 2 {
            return Err(MeasurementError::unavailable(format!(
                "not enough energy counter readings, {n_failures} polls failed",
            )));
        }
        let total = samples[samples.len() - 1].energy - samples[0].energy;
        info!(?total, n_samples = samples.len(), n_failures, "measured");
        Ok(EnergyReading { strategy: Strategy::Counter, total, samples, utilization: None })
    }
}

#[cfg(test)]
pub mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use approx::assert_abs_diff_eq;
    use tokio::time::sleep;

    use super::*;

    /// Counter that grows by a fixed step on every read.
    pub struct Ramp {
        pub next: f64,
        pub step: f64,
    }

    impl EnergyCounter for Ramp {
        fn read(&mut self) -> Result<Joules> {
            let energy = Joules::from(self.next);
            self.next += self.step;
            Ok(energy)
        }
    }

    /// Counter without access to the underlying signal.
    pub struct Unreadable;

    impl EnergyCounter for Unreadable {
        fn read(&mut self) -> Result<Joules> {
            bail!("permission denied")
        }
    }

    /// Counter that breaks once the flag is raised.
    struct Breakable(Arc<AtomicBool>);

    impl EnergyCounter for Breakable {
        fn read(&mut self) -> Result<Joules> {
            ensure!(!self.0.load(Ordering::Relaxed), "broken");
            Ok(Joules::from(1.0))
        }
    }

    #[tokio::test]
    async fn test_total_is_last_minus_first() -> Result {
        let measurement = CounterEstimator::new(Ramp { next: 1000.0, step: 2.5 })
            .start(Duration::from_millis(5))?;
        sleep(Duration::from_millis(50)).await;
        let reading = measurement.stop().await?;

        assert_eq!(reading.strategy, Strategy::Counter);
        assert!(reading.samples.len() >= 2);
        assert!(reading.samples.is_sorted_by_key(|sample| sample.energy));
        #[expect(clippy::cast_precision_loss)]
        let expected = 2.5 * (reading.samples.len() - 1) as f64;
        assert_abs_diff_eq!(reading.total.0.0, expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_short_window_uses_final_reading() -> Result {
        let measurement = CounterEstimator::new(Ramp { next: 0.0, step: 7.0 })
            .start(Duration::from_secs(3600))?;
        let reading = measurement.stop().await?;
        assert_eq!(reading.samples.len(), 2);
        assert_abs_diff_eq!(reading.total.0.0, 7.0);
        Ok(())
    }

    #[test]
    fn test_unreadable_baseline() {
        let result = CounterEstimator::new(Unreadable).start(Duration::from_millis(5));
        assert!(matches!(result, Err(MeasurementError::MeasurementUnavailable(_))));
    }

    #[tokio::test]
    async fn test_every_poll_failed() -> Result {
        let is_broken = Arc::new(AtomicBool::new(false));
        let measurement = CounterEstimator::new(Breakable(Arc::clone(&is_broken)))
            .start(Duration::from_millis(5))?;
        is_broken.store(true, Ordering::Relaxed);
        sleep(Duration::from_millis(30)).await;
        let result = measurement.stop().await;
        assert!(matches!(result, Err(MeasurementError::MeasurementUnavailable(_))));
        Ok(())
    }

    #[test]
    fn test_backwards_reading_rejected() {
        let mut probe =
            CounterProbe { counter: Box::new(Ramp { next: 10.0, step: -1.0 }), last: None };
        assert!(probe.probe().is_ok());
        assert!(probe.probe().is_err());
    }
}
