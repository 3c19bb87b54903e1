//! Monetary amounts and the tolerance used to compare them.
//!
//! Amounts are binary floating point, so every "is this zero?" or "do these match?"
//! question goes through a [`Tolerance`] instead of `==`. The tolerance scales with the
//! magnitude of the values involved: a 1e-6 absolute floor, widened by 1e-9 of the
//! magnitude for large ledgers.

use core::iter::Sum;
use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// A signed monetary amount.
#[derive(Debug, Copy, Clone, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(f64);

impl Amount {
    pub const ZERO: Amount = Amount(0.0);

    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> f64 {
        self.0
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0.0
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<f64> for Amount {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Mul<f64> for Amount {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<f64> for Amount {
    type Output = Self;

    fn div(self, rhs: f64) -> Self::Output {
        Self(self.0 / rhs)
    }
}

/// Left-to-right fold in iteration order, so callers control summation order.
impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + *a)
    }
}

/// Comparison tolerance for amounts.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Tolerance(f64);

impl Tolerance {
    /// Absolute floor for every comparison.
    pub const ABSOLUTE: f64 = 1e-6;
    /// Fraction of the magnitude added on top of the floor for large values.
    pub const RELATIVE: f64 = 1e-9;

    /// Fixed absolute tolerance.
    pub fn absolute(epsilon: f64) -> Self {
        Self(epsilon.abs())
    }

    /// Tolerance proportional to the magnitude of the amounts being compared.
    pub fn for_magnitude(magnitude: f64) -> Self {
        Self(Self::ABSOLUTE.max(magnitude.abs() * Self::RELATIVE))
    }

    pub fn epsilon(self) -> f64 {
        self.0
    }

    pub fn is_zero(self, amount: Amount) -> bool {
        amount.0.abs() <= self.0
    }

    pub fn approx_eq(self, a: Amount, b: Amount) -> bool {
        (a.0 - b.0).abs() <= self.0
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self(Self::ABSOLUTE)
    }
}
