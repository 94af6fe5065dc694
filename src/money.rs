//! Monetary primitives.
//!
//! All amounts handed between calculation steps are whole yen.  Rates
//! are stored exactly as parts-per-million so that a product such as
//! `18_500_000 × 23.2%` is computed in integer arithmetic and never
//! lands a hair below the true value before truncation.  The exact
//! product of an amount and a rate is a [`Micros`] value (millionths of
//! a yen) which a [`RoundingPolicy`] turns back into whole yen.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

use crate::error::TaxError;

/// An amount of Japanese yen.  Inputs are signed so that negative
/// values can be detected and rejected instead of wrapping.
pub type Yen = i64;

const PPM: i128 = 1_000_000;

/// A rate expressed exactly in parts-per-million (`232_000` = 23.2%).
///
/// Serialised as a plain fraction (`0.232`) so configuration files read
/// naturally.  Fractions are accepted to six decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Rate(u32);

impl Rate {
    /// A rate of `ppm` parts per million.
    pub const fn from_ppm(ppm: u32) -> Self {
        Rate(ppm)
    }

    pub fn from_fraction(fraction: f64) -> Result<Self, TaxError> {
        if !fraction.is_finite() || fraction < 0.0 {
            return Err(TaxError::Configuration(format!(
                "rate {fraction} must be a finite, non-negative fraction"
            )));
        }
        let scaled = (fraction * 1_000_000.0).round();
        if scaled > f64::from(u32::MAX) {
            return Err(TaxError::Configuration(format!(
                "rate {fraction} is out of range"
            )));
        }
        Ok(Rate(scaled as u32))
    }

    /// The rate in parts per million.
    pub fn ppm(self) -> u32 {
        self.0
    }

    pub fn as_fraction(self) -> f64 {
        f64::from(self.0) / 1_000_000.0
    }

    /// The rate as a percentage, rounded to two decimals for reporting.
    pub fn as_percent(self) -> f64 {
        round2(f64::from(self.0) / 10_000.0)
    }

    /// Exact product `amount × rate`, in millionths of a yen.  Nothing is
    /// rounded here; see [`RoundingPolicy::to_yen`].
    pub fn apply(self, amount: Yen) -> Micros {
        Micros(i128::from(amount) * i128::from(self.0))
    }
}

impl TryFrom<f64> for Rate {
    type Error = TaxError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Rate::from_fraction(value)
    }
}

impl From<Rate> for f64 {
    fn from(rate: Rate) -> Self {
        rate.as_fraction()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", f64::from(self.0) / 10_000.0)
    }
}

/// An exact amount in millionths of a yen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Micros(i128);

impl Micros {
    pub const ZERO: Micros = Micros(0);

    pub fn from_yen(yen: Yen) -> Self {
        Micros(i128::from(yen) * PPM)
    }

    /// True when the value is a whole number of yen.
    pub fn is_whole(self) -> bool {
        self.0 % PPM == 0
    }

    /// Whole yen, discarding any fraction (floor for non-negative values).
    pub fn floor_yen(self) -> Yen {
        saturate(self.0.div_euclid(PPM))
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / PPM as f64
    }
}

impl Add for Micros {
    type Output = Micros;

    fn add(self, rhs: Micros) -> Micros {
        Micros(self.0 + rhs.0)
    }
}

impl AddAssign for Micros {
    fn add_assign(&mut self, rhs: Micros) {
        self.0 += rhs.0;
    }
}

impl Sub for Micros {
    type Output = Micros;

    fn sub(self, rhs: Micros) -> Micros {
        Micros(self.0 - rhs.0)
    }
}

fn saturate(value: i128) -> Yen {
    Yen::try_from(value).unwrap_or(if value < 0 { Yen::MIN } else { Yen::MAX })
}

/// How an exact amount becomes whole yen at the end of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingPolicy {
    /// Drop the fractional yen (the statutory default).
    #[default]
    Truncate,
    /// Round half a yen and above up.
    RoundHalfUp,
    /// Apply no rounding step: the exact value stays available through
    /// [`Micros`], and the whole-yen view is its integer part.  Every
    /// whole-yen figure an engine reports is therefore the same as under
    /// [`RoundingPolicy::Truncate`]; the two differ only for callers that
    /// work with the exact [`Micros`] value.
    None,
}

impl RoundingPolicy {
    pub fn to_yen(self, amount: Micros) -> Yen {
        match self {
            RoundingPolicy::Truncate | RoundingPolicy::None => amount.floor_yen(),
            RoundingPolicy::RoundHalfUp => saturate((amount.0 + PPM / 2).div_euclid(PPM)),
        }
    }

    /// `amount × rate` reduced to whole yen under this policy.
    pub fn apply(self, amount: Yen, rate: Rate) -> Yen {
        self.to_yen(rate.apply(amount))
    }
}

/// Round to two decimal places, as reported rates are.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / whole × 100`, two decimals, or 0 when `whole` is not positive.
pub fn percent_of(part: Yen, whole: Yen) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}
