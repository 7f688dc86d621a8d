use std::{
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, ErrorKind, Write},
    path::{Path, PathBuf},
};

use greenpipeline_quantities::{energy::Joules, mass::Grams};

use crate::{core::result::MeasurementResult, prelude::*};

/// Append-only JSON Lines log of measurement results.
pub struct History {
    path: PathBuf,
}

impl History {
    pub const DEFAULT_PATH: &'static str = ".greenpipeline/history.jsonl";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn append(&self, result: &MeasurementResult) -> Result {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create `{}`", parent.display()))?;
        }
        let mut line = serde_json::to_string(result).context("failed to serialize the result")?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .with_context(|| format!("failed to append to `{}`", self.path.display()))?;
        debug!("appended");
        Ok(())
    }

    /// Read every entry in the order of appending.
    ///
    /// A missing file is an empty history. Lines that cannot be parsed are skipped.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn read_all(&self) -> Result<Vec<MeasurementResult>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                info!("no history yet");
                return Ok(Vec::new());
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to open `{}`", self.path.display()));
            }
        };

        let mut results = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("failed to read `{}`", self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(result) => results.push(result),
                Err(error) => warn!(line_number = index + 1, "skipping a malformed entry: {error}"),
            }
        }
        Ok(results)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Totals {
    pub n_runs: usize,
    pub n_incomplete: usize,
    pub energy: Joules,
    pub emissions: Grams,
}

impl<'a> FromIterator<&'a MeasurementResult> for Totals {
    fn from_iter<T: IntoIterator<Item = &'a MeasurementResult>>(iter: T) -> Self {
        let mut totals =
            Self { n_runs: 0, n_incomplete: 0, energy: Joules::ZERO, emissions: Grams::ZERO };
        for result in iter {
            totals.n_runs += 1;
            if result.measurement_incomplete {
                totals.n_incomplete += 1;
            }
            totals.energy += result.energy.unwrap_or(Joules::ZERO);
            totals.emissions += result.emissions().unwrap_or(Grams::ZERO);
        }
        totals
    }
}

impl Totals {
    pub fn smartphone_charges(self) -> f64 {
        (self.energy / MeasurementResult::SMARTPHONE_CHARGE).0
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::core::result::tests::readme_fixture;

    #[test]
    fn test_missing_file_is_empty() -> Result {
        let directory = TempDir::new()?;
        let history = History::new(directory.path().join("history.jsonl"));
        assert!(history.read_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_append_and_read() -> Result {
        let directory = TempDir::new()?;
        let history = History::new(directory.path().join("nested").join("history.jsonl"));

        let mut first = readme_fixture()?;
        first.command = "first".to_string();
        let mut second = readme_fixture()?;
        second.command = "second".to_string();
        second.energy = None;
        second.sci = None;
        second.measurement_incomplete = true;
        history.append(&first)?;
        history.append(&second)?;

        let all = history.read_all()?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].command, "first");
        assert_eq!(all[1].command, "second");
        assert!(all[1].measurement_incomplete);
        Ok(())
    }

    #[test]
    fn test_malformed_line_is_skipped() -> Result {
        let directory = TempDir::new()?;
        let history = History::new(directory.path().join("history.jsonl"));
        history.append(&readme_fixture()?)?;
        OpenOptions::new().append(true).open(history.path())?.write_all(b"{not json\n\n")?;
        history.append(&readme_fixture()?)?;
        assert_eq!(history.read_all()?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_totals() -> Result {
        let complete = readme_fixture()?;
        let mut incomplete = readme_fixture()?;
        incomplete.energy = None;
        incomplete.sci = None;
        incomplete.measurement_incomplete = true;

        let totals: Totals = [&complete, &complete, &incomplete].into_iter().collect();
        assert_eq!(totals.n_runs, 3);
        assert_eq!(totals.n_incomplete, 1);
        assert_abs_diff_eq!(totals.energy.0.0, 2261.0, epsilon = 1e-9);
        let emissions = 2.0 * 1130.50 / 3_600_000.0 * 165.0;
        assert_abs_diff_eq!(totals.emissions.0.0, emissions, epsilon = 1e-12);
        assert_abs_diff_eq!(totals.smartphone_charges(), 2261.0 / 44_640.0, epsilon = 1e-12);
        Ok(())
    }
}
