use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;

use crate::{core::error::MeasurementError, prelude::*};

/// `interval_at` cannot tick with a zero period.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Single fallible reading of some signal.
pub trait Probe: Send + 'static {
    type Sample: Send + 'static;

    fn probe(&mut self) -> Result<Self::Sample>;
}

pub struct Samples<P: Probe> {
    pub probe: P,
    pub samples: Vec<P::Sample>,
    pub n_failures: usize,
}

/// Background task polling a probe on a fixed interval.
///
/// The task is cancelled when the sampler is joined or dropped.
pub struct Sampler<P: Probe> {
    token: CancellationToken,
    task: JoinHandle<Samples<P>>,
}

impl<P: Probe> Sampler<P> {
    pub fn spawn(probe: P, initial_samples: Vec<P::Sample>, period: Duration) -> Self {
        let token = CancellationToken::new();
        let task = tokio::spawn(run(probe, initial_samples, period, token.clone()));
        Self { token, task }
    }

    #[instrument(skip_all)]
    pub async fn join(mut self) -> Result<Samples<P>, MeasurementError> {
        self.token.cancel();
        let samples = (&mut self.task).await.map_err(|error| {
            MeasurementError::unavailable(format!("sampling task failed: {error}"))
        })?;
        debug!(n_samples = samples.samples.len(), samples.n_failures, "joined");
        Ok(samples)
    }
}

impl<P: Probe> Drop for Sampler<P> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run<P: Probe>(
    mut probe: P,
    mut samples: Vec<P::Sample>,
    period: Duration,
    token: CancellationToken,
) -> Samples<P> {
    let period = period.max(MIN_PERIOD);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut n_failures = 0;

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => match probe.probe() {
                Ok(sample) => samples.push(sample),
                Err(error) => {
                    n_failures += 1;
                    debug!(n_failures, "skipping the failed poll: {error:#}");
                }
            },
        }
    }

    Samples { probe, samples, n_failures }
}
