use std::{
    fs,
    path::{Path, PathBuf},
};

use greenpipeline_quantities::energy::Joules;
use itertools::Itertools;

use crate::{core::estimator::counter::EnergyCounter, prelude::*};

/// Linux powercap interface to the RAPL package energy counters.
pub struct Powercap {
    root: PathBuf,
    zones: Vec<Zone>,
}

impl Powercap {
    pub const ROOT: &'static str = "/sys/class/powercap";

    pub fn discover() -> Self {
        Self::discover_in(Path::new(Self::ROOT))
    }

    /// Find the top-level package zones, skipping subzones to avoid counting twice.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn discover_in(root: &Path) -> Self {
        let zones = match fs::read_dir(root) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .filter(|entry| is_package_zone(&entry.file_name().to_string_lossy()))
                .map(|entry| Zone::new(&entry.path()))
                .sorted_by(|lhs, rhs| lhs.energy_path.cmp(&rhs.energy_path))
                .collect_vec(),
            Err(error) => {
                debug!("powercap is not available: {error:#}");
                Vec::new()
            }
        };
        info!(n_zones = zones.len(), "discovered");
        Self { root: root.to_path_buf(), zones }
    }
}

impl EnergyCounter for Powercap {
    fn read(&mut self) -> Result<Joules> {
        ensure!(!self.zones.is_empty(), "no RAPL package zones under `{}`", self.root.display());
        let microjoules = self.zones.iter_mut().map(Zone::read).sum::<Result<u64>>()?;
        Ok(Joules::from_microjoules(microjoules))
    }
}

/// Matches `intel-rapl:0` but not its subzones like `intel-rapl:0:1`.
fn is_package_zone(name: &str) -> bool {
    name.strip_prefix("intel-rapl:")
        .is_some_and(|index| !index.is_empty() && index.bytes().all(|byte| byte.is_ascii_digit()))
}

struct Zone {
    energy_path: PathBuf,

    /// Counter wraps around after this value, µJ.
    max_range: Option<u64>,

    last_raw: Option<u64>,

    /// Accumulated energy since discovery, µJ.
    accumulated: u64,
}

impl Zone {
    fn new(path: &Path) -> Self {
        let max_range = read_microjoules(&path.join("max_energy_range_uj")).ok();
        Self { energy_path: path.join("energy_uj"), max_range, last_raw: None, accumulated: 0 }
    }

    fn read(&mut self) -> Result<u64> {
        let raw = read_microjoules(&self.energy_path)?;
        if let Some(last_raw) = self.last_raw {
            let delta = if raw >= last_raw {
                raw - last_raw
            } else if let Some(max_range) = self.max_range {
                trace!(raw, last_raw, max_range, "wrapped around");
                let rest = max_range.checked_sub(last_raw).with_context(|| {
                    format!(
                        "`{}` reading {last_raw} is outside its range of {max_range}",
                        self.energy_path.display(),
                    )
                })?;
                rest.checked_add(raw).context("wrapped energy delta overflowed")?
            } else {
                bail!("`{}` went backwards without a known range", self.energy_path.display());
            };
            self.accumulated = self
                .accumulated
                .checked_add(delta)
                .context("accumulated energy overflowed")?;
        }
        self.last_raw = Some(raw);
        Ok(self.accumulated)
    }
}

fn read_microjoules(path: &Path) -> Result<u64> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?
        .trim()
        .parse()
        .with_context(|| format!("failed to parse `{}`", path.display()))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    use super::*;

    fn write_zone(root: &Path, name: &str, energy: u64, max_range: u64) -> Result<PathBuf> {
        let path = root.join(name);
        fs::create_dir_all(&path)?;
        fs::write(path.join("energy_uj"), format!("{energy}\n"))?;
        fs::write(path.join("max_energy_range_uj"), format!("{max_range}\n"))?;
        Ok(path)
    }

    #[test]
    fn test_is_package_zone() {
        assert!(is_package_zone("intel-rapl:0"));
        assert!(is_package_zone("intel-rapl:12"));
        assert!(!is_package_zone("intel-rapl:0:1"));
        assert!(!is_package_zone("intel-rapl:"));
        assert!(!is_package_zone("dtpm"));
    }

    #[test]
    fn test_sums_packages_and_skips_subzones() -> Result {
        let root = TempDir::new()?;
        let package_0 = write_zone(root.path(), "intel-rapl:0", 1_000_000, 10_000_000)?;
        let package_1 = write_zone(root.path(), "intel-rapl:1", 5_000_000, 10_000_000)?;
        let core = write_zone(root.path(), "intel-rapl:0:0", 0, 10_000_000)?;

        let mut powercap = Powercap::discover_in(root.path());
        assert_eq!(powercap.zones.len(), 2);
        assert_abs_diff_eq!(powercap.read()?.0.0, 0.0);

        fs::write(package_0.join("energy_uj"), "3000000")?;
        fs::write(package_1.join("energy_uj"), "5500000")?;
        fs::write(core.join("energy_uj"), "9000000")?;
        assert_abs_diff_eq!(powercap.read()?.0.0, 2.5, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_wrap_around() -> Result {
        let root = TempDir::new()?;
        let package = write_zone(root.path(), "intel-rapl:0", 9_000_000, 10_000_000)?;
        let mut powercap = Powercap::discover_in(root.path());
        powercap.read()?;

        fs::write(package.join("energy_uj"), "1000000")?;
        assert_abs_diff_eq!(powercap.read()?.0.0, 2.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_reading_above_range() -> Result {
        let root = TempDir::new()?;
        let package = write_zone(root.path(), "intel-rapl:0", 12_000_000, 10_000_000)?;
        let mut powercap = Powercap::discover_in(root.path());
        powercap.read()?;

        fs::write(package.join("energy_uj"), "1000000")?;
        let error = powercap.read().unwrap_err();
        assert!(error.to_string().contains("outside its range"), "{error:#}");
        Ok(())
    }

    #[test]
    fn test_missing_root() {
        let mut powercap = Powercap::discover_in(Path::new("/nonexistent/powercap"));
        assert!(powercap.read().is_err());
    }
}
