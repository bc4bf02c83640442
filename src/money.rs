//! Exact money amounts stored as integer minor units (cents).
//!
//! Balances are accumulated over many operations, so binary floating point is
//! never used for arithmetic. [`Money`] wraps an `i64` number of cents, is
//! persisted as a `BIGINT` column through `DeriveValueType`, and converts to and
//! from [`rust_decimal::Decimal`] at the edges where callers hand in amounts.

use crate::errors::{Error, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sea_orm::DeriveValueType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;

/// Largest magnitude accepted from callers: one trillion major units.
pub const MAX_MINOR_UNITS: i64 = 100_000_000_000_000;

const MINOR_PER_MAJOR: i64 = 100;

/// A signed amount of money with two decimal places of precision.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    DeriveValueType,
    Serialize,
    Deserialize,
)]
#[serde(into = "Decimal", try_from = "Decimal")]
pub struct Money(i64);

impl Money {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_minor(minor_units: i64) -> Self {
        Self(minor_units)
    }

    /// Whole currency units, e.g. `Money::from_major(5)` is 5.00.
    #[must_use]
    pub const fn from_major(major_units: i64) -> Self {
        Self(major_units * MINOR_PER_MAJOR)
    }

    #[must_use]
    pub const fn minor_units(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Adds `other`, reporting overflow as an invalid amount.
    pub fn try_add(self, other: Self) -> Result<Self> {
        self.checked_add(other).ok_or_else(|| Error::InvalidAmount {
            input: format!("{self} + {other} overflows"),
        })
    }

    /// Subtracts `other`, reporting overflow as an invalid amount.
    pub fn try_sub(self, other: Self) -> Result<Self> {
        self.checked_sub(other).ok_or_else(|| Error::InvalidAmount {
            input: format!("{self} - {other} overflows"),
        })
    }

    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Validates an amount supplied for a transaction or transfer: positive
    /// and no larger than [`MAX_MINOR_UNITS`].
    pub(crate) fn ensure_positive(self) -> Result<Self> {
        if self.is_positive() && self.0 <= MAX_MINOR_UNITS {
            Ok(self)
        } else {
            Err(Error::InvalidAmount {
                input: self.to_string(),
            })
        }
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.to_decimal()
    }
}

impl TryFrom<Decimal> for Money {
    type Error = Error;

    fn try_from(value: Decimal) -> Result<Self> {
        let invalid = || Error::InvalidAmount {
            input: value.to_string(),
        };

        let scaled = value
            .checked_mul(Decimal::from(MINOR_PER_MAJOR))
            .ok_or_else(invalid)?;
        if !scaled.fract().is_zero() {
            return Err(invalid());
        }

        let minor_units = scaled.to_i64().ok_or_else(invalid)?;
        if minor_units.abs() > MAX_MINOR_UNITS {
            return Err(invalid());
        }

        Ok(Self(minor_units))
    }
}

impl FromStr for Money {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let value = Decimal::from_str(trimmed).map_err(|_| Error::InvalidAmount {
            input: trimmed.to_string(),
        })?;
        Self::try_from(value)
    }
}
