use std::fmt::{Debug, Display, Formatter};

use crate::Quantity;

/// Grams of CO₂-equivalent.
pub type Grams = Quantity<0, 0, 1>;

impl Display for Grams {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4} g CO2e", self.0)
    }
}

impl Debug for Grams {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}gCO2e", self.0)
    }
}
