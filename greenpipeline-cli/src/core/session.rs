use std::{future::Future, mem, sync::Arc, time::Duration};

use bon::bon;
use chrono::{DateTime, Local};
use greenpipeline_quantities::{intensity::CarbonIntensity, mass::Grams, time::Seconds};
use tokio::time::Instant;

use crate::{
    core::{
        command::{CommandOutcome, WrappedCommand},
        error::MeasurementError,
        estimator::{EnergyReading, Estimator, RunningEstimate},
        intensity::{CarbonIntensityProvider, lookup_or_fallback},
        location::Location,
        result::MeasurementResult,
        sci::SciCalculator,
    },
    prelude::*,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, derive_more::Display)]
pub enum SessionState {
    #[display("idle")]
    Idle,

    #[display("running")]
    Running,

    #[display("stopped")]
    Stopped,

    #[display("reported")]
    Reported,

    #[display("failed")]
    Failed,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub location: Location,
    pub functional_unit_count: u32,
    pub functional_unit: String,
    pub calculator: SciCalculator,

    /// Substitute intensity for locations the provider does not know.
    pub fallback_intensity: Option<CarbonIntensity>,

    pub sampling_interval: Duration,
}

#[bon]
impl SessionConfig {
    #[builder]
    pub fn new(
        location: Location,
        #[builder(default = 1)] functional_unit_count: u32,
        #[builder(into, default = String::from("run"))] functional_unit: String,
        #[builder(default = Grams::ZERO)] embodied_overhead: Grams,
        fallback_intensity: Option<CarbonIntensity>,
        #[builder(default = Duration::from_millis(100))] sampling_interval: Duration,
    ) -> Result<Self, MeasurementError> {
        if functional_unit_count == 0 {
            return Err(MeasurementError::InvalidFunctionalUnit(functional_unit_count));
        }
        if !embodied_overhead.is_physical() {
            return Err(MeasurementError::InvalidEmbodiedOverhead(embodied_overhead));
        }
        if let Some(intensity) = fallback_intensity
            && !intensity.is_physical()
        {
            return Err(MeasurementError::InvalidIntensity { location, value: intensity.0.0 });
        }
        if sampling_interval.is_zero() {
            return Err(MeasurementError::InvalidSamplingInterval);
        }
        Ok(Self {
            location,
            functional_unit_count,
            functional_unit,
            calculator: SciCalculator { embodied_overhead },
            fallback_intensity,
            sampling_interval,
        })
    }
}

/// Single-use measurement of one wrapped command.
///
/// `Idle → Running → Stopped → Reported`, or `Failed` when the energy or the carbon intensity
/// could not be determined. Each transition is allowed exactly once.
pub struct MeasurementSession {
    command: WrappedCommand,
    config: SessionConfig,
    provider: Arc<dyn CarbonIntensityProvider>,
    phase: Phase,
}

enum Phase {
    Idle { estimator: Estimator, fallback_estimator: Option<Estimator> },
    Running(Running),
    Stopped(Stopped),
    Reported,
    Failed,
}

impl Phase {
    const fn state(&self) -> SessionState {
        match self {
            Self::Idle { .. } => SessionState::Idle,
            Self::Running(_) => SessionState::Running,
            Self::Stopped(_) => SessionState::Stopped,
            Self::Reported => SessionState::Reported,
            Self::Failed => SessionState::Failed,
        }
    }
}

struct Running {
    started_at: DateTime<Local>,
    start_time: Instant,
    estimate: Result<RunningEstimate, MeasurementError>,
}

struct Stopped {
    started_at: DateTime<Local>,
    finished_at: DateTime<Local>,
    duration: Seconds,
    outcome: CommandOutcome,
    energy: Result<EnergyReading, MeasurementError>,
}

#[bon]
impl MeasurementSession {
    #[builder]
    pub fn new(
        command: WrappedCommand,
        config: SessionConfig,
        provider: Arc<dyn CarbonIntensityProvider>,
        estimator: Estimator,

        /// Used when the primary estimator cannot start.
        fallback_estimator: Option<Estimator>,
    ) -> Self {
        Self { command, config, provider, phase: Phase::Idle { estimator, fallback_estimator } }
    }
}

impl MeasurementSession {
    pub const fn state(&self) -> SessionState {
        self.phase.state()
    }

    /// Run the whole lifecycle: start, execute the command, stop, and finalize.
    ///
    /// The session is aborted with a partial result if the command cannot be spawned.
    #[instrument(skip_all, fields(command = %self.command))]
    pub async fn measure(
        &mut self,
        cancellation: impl Future<Output = ()>,
    ) -> Result<MeasurementResult, MeasurementError> {
        self.start()?;
        match self.command.run(cancellation).await {
            Ok(outcome) => {
                self.stop(outcome).await?;
                self.finalize().await
            }
            Err(error) => self.abort(&format!("{error:#}")).await,
        }
    }

    /// Start the energy estimate.
    ///
    /// An estimator that cannot start does not stop the command from running:
    /// the failure is carried into the result instead.
    pub fn start(&mut self) -> Result<(), MeasurementError> {
        let (estimator, fallback_estimator) = match mem::replace(&mut self.phase, Phase::Failed) {
            Phase::Idle { estimator, fallback_estimator } => (estimator, fallback_estimator),
            phase => return Err(self.reject(phase, "start")),
        };

        let period = self.config.sampling_interval;
        let estimate = estimator.start(period).or_else(|error| match fallback_estimator {
            Some(fallback) => {
                warn!(%error, fallback = %fallback.strategy(), "falling back…");
                fallback.start(period)
            }
            None => Err(error),
        });
        if let Err(error) = &estimate {
            warn!("measuring without an energy estimate: {error}");
        }

        info!(location = %self.config.location, "started");
        self.phase = Phase::Running(Running {
            started_at: Local::now(),
            start_time: Instant::now(),
            estimate,
        });
        Ok(())
    }

    /// Stop the estimate after the command has completed, failed, or been interrupted.
    pub async fn stop(&mut self, outcome: CommandOutcome) -> Result<(), MeasurementError> {
        let running = match mem::replace(&mut self.phase, Phase::Failed) {
            Phase::Running(running) => running,
            phase => return Err(self.reject(phase, "stop")),
        };

        let finished_at = Local::now();
        let duration = Seconds::from(running.start_time.elapsed());
        let energy = match running.estimate {
            Ok(estimate) => estimate.stop().await,
            Err(error) => Err(error),
        };
        if let Ok(reading) = &energy {
            let n_samples = reading.samples.len();
            debug!(%reading.strategy, ?reading.total, n_samples, "estimated");
        }
        info!(?duration, %outcome, "stopped");

        self.phase = Phase::Stopped(Stopped {
            started_at: running.started_at,
            finished_at,
            duration,
            outcome,
            energy,
        });
        Ok(())
    }

    /// Resolve the carbon intensity and compute the score.
    ///
    /// Missing energy or intensity yields a partial result and moves the session to `Failed`.
    pub async fn finalize(&mut self) -> Result<MeasurementResult, MeasurementError> {
        let stopped = match mem::replace(&mut self.phase, Phase::Failed) {
            Phase::Stopped(stopped) => stopped,
            phase => return Err(self.reject(phase, "finalize")),
        };

        let mut issues = Vec::new();
        if stopped.outcome.is_interrupted() {
            issues.push(format!("the command {} before completion", stopped.outcome));
        }
        let reading = stopped.energy.map_err(|error| issues.push(error.to_string())).ok();
        let intensity = lookup_or_fallback(
            self.provider.as_ref(),
            &self.config.location,
            self.config.fallback_intensity,
        )
        .await
        .map_err(|error| issues.push(error.to_string()))
        .ok();
        let sci = match (&reading, &intensity) {
            (Some(reading), Some(record)) => Some(self.config.calculator.compute(
                reading.total,
                record.intensity,
                self.config.functional_unit_count,
            )?),
            _ => None,
        };

        self.phase =
            if reading.is_some() && intensity.is_some() { Phase::Reported } else { Phase::Failed };
        let result = MeasurementResult::builder()
            .command(self.command.command.clone())
            .started_at(stopped.started_at)
            .finished_at(stopped.finished_at)
            .duration(stopped.duration)
            .outcome(stopped.outcome)
            .location(self.config.location.clone())
            .functional_unit(self.config.functional_unit.clone())
            .maybe_strategy(reading.as_ref().map(|reading| reading.strategy))
            .maybe_energy(reading.as_ref().map(|reading| reading.total))
            .maybe_utilization(reading.as_ref().and_then(|reading| reading.utilization))
            .maybe_intensity(intensity)
            .maybe_sci(sci)
            .measurement_incomplete(!issues.is_empty())
            .issues(issues)
            .build();

        if result.measurement_incomplete {
            warn!(state = %self.state(), issues = ?result.issues, "measurement is incomplete");
        } else {
            info!(state = %self.state(), sci = ?result.sci.map(|sci| sci.score), "finalized");
        }
        Ok(result)
    }

    /// Give up on the measurement, keeping only the timing.
    pub async fn abort(&mut self, reason: &str) -> Result<MeasurementResult, MeasurementError> {
        let (started_at, finished_at, duration, outcome) =
            match mem::replace(&mut self.phase, Phase::Failed) {
                Phase::Running(running) => {
                    let finished_at = Local::now();
                    let duration = Seconds::from(running.start_time.elapsed());
                    if let Ok(estimate) = running.estimate
                        && let Err(error) = estimate.stop().await
                    {
                        debug!("discarding the estimate: {error}");
                    }
                    (running.started_at, finished_at, duration, CommandOutcome::FailedToStart)
                }
                Phase::Stopped(stopped) => {
                    (stopped.started_at, stopped.finished_at, stopped.duration, stopped.outcome)
                }
                phase => return Err(self.reject(phase, "abort")),
            };

        warn!(reason, "aborted");
        Ok(MeasurementResult::builder()
            .command(self.command.command.clone())
            .started_at(started_at)
            .finished_at(finished_at)
            .duration(duration)
            .outcome(outcome)
            .location(self.config.location.clone())
            .functional_unit(self.config.functional_unit.clone())
            .measurement_incomplete(true)
            .issues(vec![reason.to_string()])
            .build())
    }

    /// Put the phase back and build the error for an operation that is not allowed in it.
    fn reject(&mut self, phase: Phase, operation: &'static str) -> MeasurementError {
        let state = phase.state();
        self.phase = phase;
        MeasurementError::InvalidSessionState { operation, state }
    }
}

#[cfg(test)]
mod tests {
    use std::future::pending;

    use approx::assert_abs_diff_eq;
    use greenpipeline_quantities::energy::Joules;
    use tokio::time::sleep;

    use super::*;
    use crate::core::{
        estimator::{
            Strategy,
            counter::{
                CounterEstimator,
                tests::{Ramp, Unreadable},
            },
            model::{
                ModelEstimator,
                PowerModel,
                Utilization,
                tests::Constant,
            },
        },
        intensity::{IntensitySource, table::StaticTable},
    };

    fn provider() -> Arc<dyn CarbonIntensityProvider> {
        Arc::new(StaticTable::from_iter([
            (Location::from_static("CO"), CarbonIntensity::from(165)),
            (Location::from_static("DE"), CarbonIntensity::from(420)),
        ]))
    }

    fn ramp(step: f64) -> Estimator {
        Estimator::Counter(CounterEstimator::new(Ramp { next: 0.0, step }))
    }

    fn model() -> Estimator {
        let utilization = Utilization { cpu: 0.5, memory_bytes: 1 << 30 };
        Estimator::Model(ModelEstimator::new(PowerModel::host(), Constant(utilization)))
    }

    fn config(location: &str) -> Result<SessionConfig> {
        Ok(SessionConfig::builder()
            .location(location.parse()?)
            .functional_unit("build")
            .sampling_interval(Duration::from_millis(5))
            .build()?)
    }

    fn session(command: &str, config: SessionConfig, estimator: Estimator) -> MeasurementSession {
        MeasurementSession::builder()
            .command(WrappedCommand::new(command))
            .config(config)
            .provider(provider())
            .estimator(estimator)
            .build()
    }

    #[tokio::test]
    async fn test_complete_measurement() -> Result {
        let mut session = session("sleep 0.05", config("co")?, ramp(1.0));
        let result = session.measure(pending()).await?;

        assert_eq!(session.state(), SessionState::Reported);
        assert!(!result.measurement_incomplete, "{:?}", result.issues);
        assert!(result.issues.is_empty());
        assert!(result.outcome.is_success());
        assert_eq!(result.strategy, Some(Strategy::Counter));
        assert!(result.duration >= Seconds::from(0.05));
        assert_eq!(result.functional_unit, "build");

        let energy = result.energy.unwrap();
        assert!(energy > Joules::ZERO);
        let record = result.intensity.unwrap();
        assert_eq!(record.source, IntensitySource::Table);
        let sci = result.sci.unwrap();
        assert_abs_diff_eq!(sci.emissions.0.0, energy.to_kilowatt_hours() * 165.0);
        assert_eq!(sci.score, sci.emissions);
        Ok(())
    }

    #[tokio::test]
    async fn test_exit_code_is_preserved() -> Result {
        let mut session = session("exit 7", config("DE")?, ramp(1.0));
        let result = session.measure(pending()).await?;
        assert_eq!(result.outcome.exit_code(), 7);
        assert!(!result.measurement_incomplete);
        Ok(())
    }

    #[tokio::test]
    async fn test_start_twice() -> Result {
        let mut session = session("true", config("CO")?, ramp(1.0));
        session.start()?;
        let result = session.start();
        assert!(matches!(
            result,
            Err(MeasurementError::InvalidSessionState {
                operation: "start",
                state: SessionState::Running,
            })
        ));
        assert_eq!(session.state(), SessionState::Running);
        Ok(())
    }

    #[tokio::test]
    async fn test_finalize_twice() -> Result {
        let mut session = session("true", config("CO")?, ramp(1.0));
        session.start()?;
        session.stop(CommandOutcome::Exited { code: 0 }).await?;
        session.finalize().await?;
        let result = session.finalize().await;
        assert!(matches!(
            result,
            Err(MeasurementError::InvalidSessionState {
                operation: "finalize",
                state: SessionState::Reported,
            })
        ));
        assert_eq!(session.state(), SessionState::Reported);
        Ok(())
    }

    #[tokio::test]
    async fn test_finalize_before_stop() -> Result {
        let mut session = session("true", config("CO")?, ramp(1.0));
        assert!(session.finalize().await.is_err());
        assert_eq!(session.state(), SessionState::Idle);
        session.start()?;
        assert!(session.finalize().await.is_err());
        assert_eq!(session.state(), SessionState::Running);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_location_without_fallback() -> Result {
        let mut session = session("true", config("XX")?, ramp(1.0));
        let result = session.measure(pending()).await?;

        assert_eq!(session.state(), SessionState::Failed);
        assert!(result.measurement_incomplete);
        assert!(result.intensity.is_none());
        assert!(result.sci.is_none());
        assert!(result.energy.is_some());
        assert!(result.issues.iter().any(|issue| issue.contains("`XX`")), "{:?}", result.issues);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_location_with_fallback() -> Result {
        let config = SessionConfig::builder()
            .location("XX".parse()?)
            .fallback_intensity(CarbonIntensity::from(475))
            .sampling_interval(Duration::from_millis(5))
            .build()?;
        let mut session = session("true", config, ramp(1.0));
        let result = session.measure(pending()).await?;

        assert_eq!(session.state(), SessionState::Reported);
        assert!(!result.measurement_incomplete);
        let record = result.intensity.unwrap();
        assert_eq!(record.source, IntensitySource::Fallback);
        assert_eq!(record.intensity, CarbonIntensity::from(475));
        Ok(())
    }

    #[tokio::test]
    async fn test_counter_unavailable_falls_back_to_model() -> Result {
        let mut session = MeasurementSession::builder()
            .command(WrappedCommand::new("sleep 0.05"))
            .config(config("CO")?)
            .provider(provider())
            .estimator(Estimator::Counter(CounterEstimator::new(Unreadable)))
            .fallback_estimator(model())
            .build();
        let result = session.measure(pending()).await?;

        assert_eq!(session.state(), SessionState::Reported);
        assert_eq!(result.strategy, Some(Strategy::Model));
        assert!(result.utilization.is_some());
        assert!(result.energy.unwrap() > Joules::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn test_counter_unavailable_without_fallback() -> Result {
        let mut session = session(
            "sleep 0.05",
            config("CO")?,
            Estimator::Counter(CounterEstimator::new(Unreadable)),
        );
        let result = session.measure(pending()).await?;

        assert_eq!(session.state(), SessionState::Failed);
        assert!(result.measurement_incomplete);
        assert!(result.outcome.is_success());
        assert!(result.energy.is_none());
        assert!(result.sci.is_none());
        assert!(result.intensity.is_some());
        assert!(result.duration >= Seconds::from(0.05));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_command() -> Result {
        let mut session = session("sleep 10", config("CO")?, ramp(1.0));
        let result = session.measure(sleep(Duration::from_millis(100))).await?;

        assert_eq!(session.state(), SessionState::Reported);
        assert_eq!(result.outcome, CommandOutcome::Cancelled);
        assert!(result.measurement_incomplete);
        assert!(result.sci.is_some());
        assert!(result.duration >= Seconds::from(0.1));
        assert!(result.duration < Seconds::from(5.0));
        Ok(())
    }

    #[tokio::test]
    async fn test_timed_out_command() -> Result {
        let command = WrappedCommand::new("sleep 10").with_timeout(Some(Duration::from_millis(50)));
        let mut session = MeasurementSession::builder()
            .command(command)
            .config(config("CO")?)
            .provider(provider())
            .estimator(ramp(1.0))
            .build();
        let result = session.measure(pending()).await?;

        assert_eq!(result.outcome, CommandOutcome::TimedOut);
        assert!(result.measurement_incomplete);
        assert!(result.issues[0].contains("timed out"));
        Ok(())
    }

    #[tokio::test]
    async fn test_abort_running() -> Result {
        let mut session = session("true", config("CO")?, ramp(1.0));
        session.start()?;
        let result = session.abort("failed to spawn").await?;

        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(result.outcome, CommandOutcome::FailedToStart);
        assert!(result.measurement_incomplete);
        assert!(result.energy.is_none());
        assert_eq!(result.issues, ["failed to spawn"]);
        assert!(session.abort("again").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_sessions_are_independent() -> Result {
        let mut small = session("sleep 0.05", config("CO")?, ramp(1.0));
        let mut large = session("sleep 0.05", config("DE")?, ramp(1000.0));
        let (small, large) = tokio::join!(small.measure(pending()), large.measure(pending()));
        let (small, large) = (small?, large?);

        let small_energy = small.energy.unwrap().0.0;
        let large_energy = large.energy.unwrap().0.0;
        assert_abs_diff_eq!(small_energy, small_energy.round());
        assert_abs_diff_eq!(large_energy % 1000.0, 0.0);
        assert!(large_energy >= 1000.0);
        assert_eq!(small.intensity.unwrap().location.as_str(), "CO");
        assert_eq!(large.intensity.unwrap().location.as_str(), "DE");
        Ok(())
    }

    #[test]
    fn test_invalid_config() -> Result {
        let location: Location = "CO".parse()?;

        let result =
            SessionConfig::builder().location(location.clone()).functional_unit_count(0).build();
        assert!(matches!(result, Err(MeasurementError::InvalidFunctionalUnit(0))));

        let result = SessionConfig::builder()
            .location(location.clone())
            .embodied_overhead(Grams::from(-1))
            .build();
        assert!(matches!(result, Err(MeasurementError::InvalidEmbodiedOverhead(_))));

        let result =
            SessionConfig::builder().location(location).sampling_interval(Duration::ZERO).build();
        assert!(matches!(result, Err(MeasurementError::InvalidSamplingInterval)));
        Ok(())
    }
}
