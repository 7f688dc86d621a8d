use std::{
    fmt::{Debug, Display, Formatter},
    time::Duration,
};

use crate::Quantity;

pub type Seconds = Quantity<0, 1, 0>;

impl From<Duration> for Seconds {
    fn from(duration: Duration) -> Self {
        Self::from(duration.as_secs_f64())
    }
}

impl Display for Seconds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1} s", self.0)
    }
}

impl Debug for Seconds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}
