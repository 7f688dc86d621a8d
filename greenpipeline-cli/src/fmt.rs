use std::fmt::{Debug, Display, Formatter};

/// Ratio displayed as a percentage.
pub struct FormattedPercentage(pub f64);

impl Debug for FormattedPercentage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for FormattedPercentage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}%", self.0 * 100.0)
    }
}

/// Signed ratio, for differences against a baseline.
pub struct FormattedDifference(pub f64);

impl Display for FormattedDifference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:+.1}%", self.0 * 100.0)
    }
}

/// Optional value displayed as `n/a` when missing.
pub struct OrNotAvailable<T>(pub Option<T>);

impl<T: Display> Display for OrNotAvailable<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(value) => Display::fmt(value, f),
            None => f.write_str("n/a"),
        }
    }
}
