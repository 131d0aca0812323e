//! Physical dimensions of fields and equations.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Div, Mul};

/// Exponents of the seven SI base units.
///
/// The order is mass, length, time, temperature, amount of substance, current and luminous
/// intensity, which matches the usual `[M L T Θ N I J]` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DimensionSet(pub [i8; 7]);

impl DimensionSet {
    pub const fn new(mass: i8, length: i8, time: i8, temperature: i8, moles: i8, current: i8, luminous: i8) -> Self {
        Self([mass, length, time, temperature, moles, current, luminous])
    }

    pub const fn dimensionless() -> Self {
        Self([0; 7])
    }

    pub const fn mass() -> Self {
        Self::new(1, 0, 0, 0, 0, 0, 0)
    }

    pub const fn length() -> Self {
        Self::new(0, 1, 0, 0, 0, 0, 0)
    }

    pub const fn time() -> Self {
        Self::new(0, 0, 1, 0, 0, 0, 0)
    }

    pub const fn temperature() -> Self {
        Self::new(0, 0, 0, 1, 0, 0, 0)
    }

    pub const fn area() -> Self {
        Self::new(0, 2, 0, 0, 0, 0, 0)
    }

    pub const fn volume() -> Self {
        Self::new(0, 3, 0, 0, 0, 0, 0)
    }

    /// Volumetric flux, e.g. velocity times area.
    pub const fn volumetric_flux() -> Self {
        Self::new(0, 3, -1, 0, 0, 0, 0)
    }

    /// Mass flux, e.g. density times volumetric flux.
    pub const fn mass_flux() -> Self {
        Self::new(1, 0, -1, 0, 0, 0, 0)
    }

    pub fn is_dimensionless(&self) -> bool {
        self.0.iter().all(|&e| e == 0)
    }

    pub fn pow(&self, exponent: i8) -> Self {
        Self(self.0.map(|e| e * exponent))
    }

    pub fn reciprocal(&self) -> Self {
        Self(self.0.map(|e| -e))
    }
}

impl Mul for DimensionSet {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let mut exponents = self.0;
        for (e, r) in exponents.iter_mut().zip(rhs.0) {
            *e += r;
        }
        Self(exponents)
    }
}

impl Div for DimensionSet {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        self * rhs.reciprocal()
    }
}

impl fmt::Display for DimensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [m, l, t, k, n, i, j] = self.0;
        write!(f, "[{} {} {} {} {} {} {}]", m, l, t, k, n, i, j)
    }
}
