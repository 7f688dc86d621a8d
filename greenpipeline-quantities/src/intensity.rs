use std::fmt::{Debug, Display, Formatter};

use crate::Quantity;

/// Grams of CO₂-equivalent emitted per kilowatt-hour of electricity.
///
/// Dimensionally this is mass per energy, but the value is kept in g/kWh
/// as grid operators publish it; [`crate::energy::Joules`] converts on multiplication.
pub type CarbonIntensity = Quantity<-1, -1, 1>;

impl Display for CarbonIntensity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0} g/kWh", self.0)
    }
}

impl Debug for CarbonIntensity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}g/kWh", self.0)
    }
}
