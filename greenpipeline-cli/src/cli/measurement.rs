use std::{sync::Arc, time::Duration};

use clap::{ArgAction, Parser};
use greenpipeline_quantities::{intensity::CarbonIntensity, mass::Grams, power::Watts};

use crate::{
    api::{powercap::Powercap, system::SystemUtilization},
    cli::provider::ProviderArgs,
    core::{
        command::WrappedCommand,
        estimator::{
            Estimator,
            Strategy,
            counter::CounterEstimator,
            model::{ModelEstimator, PowerModel},
        },
        intensity::CarbonIntensityProvider,
        location::Location,
        session::{MeasurementSession, SessionConfig},
    },
    prelude::*,
};

#[derive(Parser)]
pub struct MeasurementArgs {
    /// Grid location code, such as `CO`, `DE`, or `US-CA`.
    #[clap(short, long, env = "GREENPIPELINE_LOCATION", default_value = Location::GLOBAL)]
    pub location: Location,

    /// Number of functional units the command delivers, such as builds or test suites.
    #[clap(
        long = "functional-units",
        env = "GREENPIPELINE_FUNCTIONAL_UNITS",
        default_value = "1",
        value_parser = clap::value_parser!(u32).range(1..),
    )]
    functional_unit_count: u32,

    /// Functional unit label for the report.
    #[clap(long, env = "GREENPIPELINE_FUNCTIONAL_UNIT", default_value = "run")]
    functional_unit: String,

    /// Embodied emissions attributed to the run, in grams of CO2e.
    #[clap(
        long = "embodied-overhead-g",
        env = "GREENPIPELINE_EMBODIED_OVERHEAD_G",
        default_value = "0"
    )]
    embodied_overhead: Grams,

    #[clap(long = "estimator", env = "GREENPIPELINE_ESTIMATOR", default_value = "counter")]
    strategy: Strategy,

    /// Switch to the utilization model if the energy counter cannot be read.
    #[clap(
        long = "estimator-fallback",
        env = "GREENPIPELINE_ESTIMATOR_FALLBACK",
        default_value_t = true,
        action = ArgAction::Set,
    )]
    estimator_fallback: bool,

    #[clap(
        long,
        env = "GREENPIPELINE_SAMPLING_INTERVAL",
        default_value = "100ms",
        value_parser = parse_sampling_interval,
    )]
    sampling_interval: humantime::Duration,

    /// Thermal design power for the utilization model, defaults to a guess by architecture.
    #[clap(
        long = "tdp-watts",
        env = "GREENPIPELINE_TDP_WATTS",
        value_parser = parse_thermal_design_power,
    )]
    thermal_design_power: Option<Watts>,

    /// Intensity in g/kWh for locations the provider does not know.
    #[clap(long, env = "GREENPIPELINE_FALLBACK_INTENSITY")]
    fallback_intensity: Option<CarbonIntensity>,

    /// Kill the command after this long.
    #[clap(long, env = "GREENPIPELINE_TIMEOUT")]
    timeout: Option<humantime::Duration>,

    #[clap(flatten)]
    pub provider: ProviderArgs,
}

impl MeasurementArgs {
    pub fn config(&self, location: Location) -> Result<SessionConfig> {
        Ok(SessionConfig::builder()
            .location(location)
            .functional_unit_count(self.functional_unit_count)
            .functional_unit(self.functional_unit.clone())
            .embodied_overhead(self.embodied_overhead)
            .maybe_fallback_intensity(self.fallback_intensity)
            .sampling_interval(self.sampling_interval.into())
            .build()?)
    }

    pub fn session(
        &self,
        command: &[String],
        config: SessionConfig,
        provider: Arc<dyn CarbonIntensityProvider>,
    ) -> MeasurementSession {
        let command = WrappedCommand::from_args(command)
            .with_timeout(self.timeout.map(Duration::from));
        let fallback_estimator = (self.estimator_fallback && self.strategy == Strategy::Counter)
            .then(|| self.estimator(Strategy::Model));
        MeasurementSession::builder()
            .command(command)
            .config(config)
            .provider(provider)
            .estimator(self.estimator(self.strategy))
            .maybe_fallback_estimator(fallback_estimator)
            .build()
    }

    fn estimator(&self, strategy: Strategy) -> Estimator {
        match strategy {
            Strategy::Counter => Estimator::Counter(CounterEstimator::new(Powercap::discover())),
            Strategy::Model => {
                let model = self
                    .thermal_design_power
                    .map_or_else(PowerModel::host, |thermal_design_power| PowerModel {
                        thermal_design_power,
                    });
                Estimator::Model(ModelEstimator::new(model, SystemUtilization::new()))
            }
        }
    }
}

fn parse_sampling_interval(value: &str) -> Result<humantime::Duration> {
    let interval: humantime::Duration = value.parse()?;
    ensure!(!interval.is_zero(), "sampling interval must be positive");
    Ok(interval)
}

fn parse_thermal_design_power(value: &str) -> Result<Watts> {
    let watts: f64 = value.parse()?;
    ensure!(watts.is_finite() && watts > 0.0, "thermal design power must be positive, got {value}");
    Ok(Watts::from(watts))
}
