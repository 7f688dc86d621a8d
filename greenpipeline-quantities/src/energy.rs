use std::{
    fmt::{Debug, Display, Formatter},
    ops::{Div, Mul},
};

use crate::{Quantity, intensity::CarbonIntensity, mass::Grams, power::Watts, time::Seconds};

pub type Joules = Quantity<1, 1, 0>;

impl Joules {
    pub const PER_KILOWATT_HOUR: f64 = 3_600_000.0;

    #[expect(clippy::cast_precision_loss)]
    pub const fn from_microjoules(microjoules: u64) -> Self {
        Self(ordered_float::OrderedFloat(microjoules as f64 * 0.000_001))
    }

    #[must_use]
    pub fn to_kilowatt_hours(self) -> f64 {
        self.0.0 / Self::PER_KILOWATT_HOUR
    }
}

impl Display for Joules {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} J", self.0)
    }
}

impl Debug for Joules {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}J", self.0)
    }
}

impl Div<Seconds> for Joules {
    type Output = Watts;

    fn div(self, rhs: Seconds) -> Self::Output {
        Quantity(self.0 / rhs.0)
    }
}

/// Emitted carbon: the energy is converted into kilowatt-hours before it is multiplied.
impl Mul<CarbonIntensity> for Joules {
    type Output = Grams;

    fn mul(self, rhs: CarbonIntensity) -> Self::Output {
        Quantity::from(self.to_kilowatt_hours() * rhs.0.0)
    }
}
