//! Fixed-point currency amount.
//!
//! # Responsibility
//! - Represent balances and prices without floating point drift.
//! - Split a total into shares whose sum is exactly the total.
//!
//! # Invariants
//! - An `Amount` is never negative.
//! - One currency unit is `MICROS_PER_UNIT` micro-units.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Number of micro-units in one currency unit.
pub const MICROS_PER_UNIT: i64 = 1_000_000;
const FRACTION_DIGITS: usize = 6;

static DECIMAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)(?:\.([0-9]{1,6}))?$").expect("valid decimal regex"));

/// Errors from constructing or parsing an [`Amount`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// Value below zero.
    Negative(i64),
    /// Value does not fit the fixed-point range.
    Overflow,
    /// Text is not a plain non-negative decimal with at most six fraction digits.
    InvalidFormat(String),
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Negative(value) => write!(f, "amount must not be negative, got {value} micro-units"),
            Self::Overflow => write!(f, "amount out of range"),
            Self::InvalidFormat(text) => write!(
                f,
                "invalid amount `{text}`; expected a decimal with at most {FRACTION_DIGITS} fraction digits"
            ),
        }
    }
}

impl Error for AmountError {}

/// Non-negative currency amount stored as integer micro-units.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Builds an amount from raw micro-units.
    pub fn from_micros(micros: i64) -> Result<Self, AmountError> {
        if micros < 0 {
            return Err(AmountError::Negative(micros));
        }
        Ok(Self(micros))
    }

    /// Builds an amount from whole currency units.
    pub fn from_units(units: u32) -> Self {
        Self(i64::from(units) * MICROS_PER_UNIT)
    }

    /// Raw micro-unit count, as persisted.
    pub fn micros(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Returns `None` when the result would be negative.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        if other.0 > self.0 {
            return None;
        }
        Some(Self(self.0 - other.0))
    }

    /// Splits this amount into `parts` shares that sum exactly to `self`.
    ///
    /// Every share gets `self / parts`; the first `self % parts` shares carry one
    /// extra micro-unit. Returns an empty vector for `parts == 0`.
    pub fn split_even(self, parts: usize) -> Vec<Amount> {
        if parts == 0 {
            return Vec::new();
        }
        let parts_i64 = parts as i64;
        let base = self.0 / parts_i64;
        let remainder = (self.0 % parts_i64) as usize;
        (0..parts)
            .map(|index| {
                if index < remainder {
                    Self(base + 1)
                } else {
                    Self(base)
                }
            })
            .collect()
    }

    /// Sums amounts, returning `None` on overflow.
    pub fn sum<'a>(amounts: impl IntoIterator<Item = &'a Amount>) -> Option<Amount> {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, |acc, amount| acc.checked_add(*amount))
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_micros(value)
    }
}

impl From<Amount> for i64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let caps = DECIMAL_RE
            .captures(trimmed)
            .ok_or_else(|| AmountError::InvalidFormat(trimmed.to_string()))?;

        let whole: i64 = caps[1].parse().map_err(|_| AmountError::Overflow)?;
        let fraction = match caps.get(2) {
            Some(digits) => {
                let padded = format!("{:0<width$}", digits.as_str(), width = FRACTION_DIGITS);
                padded
                    .parse::<i64>()
                    .map_err(|_| AmountError::InvalidFormat(trimmed.to_string()))?
            }
            None => 0,
        };

        whole
            .checked_mul(MICROS_PER_UNIT)
            .and_then(|micros| micros.checked_add(fraction))
            .map(Self)
            .ok_or(AmountError::Overflow)
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / MICROS_PER_UNIT;
        let fraction = format!("{:0width$}", self.0 % MICROS_PER_UNIT, width = FRACTION_DIGITS);
        let trimmed = fraction.trim_end_matches('0');
        if trimmed.len() < 2 {
            write!(f, "{whole}.{:0<2}", trimmed)
        } else {
            write!(f, "{whole}.{trimmed}")
        }
    }
}
