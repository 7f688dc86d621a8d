use std::time::Duration;

use sysinfo::{MINIMUM_CPU_UPDATE_INTERVAL, System};

use crate::{
    core::estimator::model::{Utilization, UtilizationSource},
    prelude::*,
};

/// Host-wide CPU and memory utilization.
pub struct SystemUtilization(System);

impl SystemUtilization {
    pub fn new() -> Self {
        let mut system = System::new();

        // CPU usage is computed between two refreshes, so this one sets the baseline.
        system.refresh_cpu_usage();
        Self(system)
    }
}

impl Default for SystemUtilization {
    fn default() -> Self {
        Self::new()
    }
}

impl UtilizationSource for SystemUtilization {
    fn sample(&mut self) -> Result<Utilization> {
        self.0.refresh_cpu_usage();
        self.0.refresh_memory();
        let cpu = f64::from(self.0.global_cpu_usage()) / 100.0;
        let memory_bytes = self.0.used_memory();
        trace!(cpu, memory_bytes, "sampled");
        Ok(Utilization { cpu, memory_bytes })
    }

    fn min_period(&self) -> Duration {
        MINIMUM_CPU_UPDATE_INTERVAL
    }
}
