use std::{
    fmt::{Debug, Display, Formatter},
    ops::Mul,
};

use crate::{Quantity, energy::Joules, time::Seconds};

pub type Watts = Quantity<1, 0, 0>;

impl Display for Watts {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1} W", self.0)
    }
}

impl Debug for Watts {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}W", self.0)
    }
}

impl Mul<Seconds> for Watts {
    type Output = Joules;

    fn mul(self, rhs: Seconds) -> Self::Output {
        Quantity(self.0 * rhs.0)
    }
}
