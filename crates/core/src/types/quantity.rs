//! Decimal quantities: hours worked and hourly rates.
//!
//! Both are stored as `NUMERIC(…, 2)` and therefore carry at most two decimal
//! places. Values with more precision are rejected rather than silently
//! rounded, so what a tutor typed is what gets stored.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing [`Hours`] or [`HourlyRate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// Hours worked must be strictly positive.
    #[error("hours worked must be greater than zero (got {0})")]
    NonPositiveHours(Decimal),
    /// A single entry covers one date, so it cannot exceed a day.
    #[error("hours worked cannot exceed {max} for a single date (got {got})")]
    TooManyHours {
        /// Upper bound.
        max: Decimal,
        /// Rejected value.
        got: Decimal,
    },
    /// Rates may be zero (volunteer subjects) but never negative.
    #[error("hourly rate cannot be negative (got {0})")]
    NegativeRate(Decimal),
    /// Larger than the stored column can hold.
    #[error("hourly rate cannot exceed {max} (got {got})")]
    RateTooHigh {
        /// Upper bound.
        max: Decimal,
        /// Rejected value.
        got: Decimal,
    },
    /// More than two decimal places.
    #[error("{0} has more than two decimal places")]
    TooPrecise(Decimal),
}

const SCALE: u32 = 2;

fn check_scale(value: Decimal) -> Result<Decimal, QuantityError> {
    let normalized = value.normalize();
    if normalized.scale() > SCALE {
        return Err(QuantityError::TooPrecise(value));
    }
    Ok(normalized)
}

/// Hours worked on a single date. Always `0 < hours <= 24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Hours(Decimal);

impl Hours {
    /// Maximum hours for one entry.
    pub const MAX: Decimal = Decimal::from_parts(24, 0, 0, false, 0);

    /// Validate and wrap an hours value.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError`] if the value is not positive, exceeds
    /// [`Hours::MAX`], or has more than two decimal places.
    pub fn new(value: Decimal) -> Result<Self, QuantityError> {
        if value <= Decimal::ZERO {
            return Err(QuantityError::NonPositiveHours(value));
        }
        if value > Self::MAX {
            return Err(QuantityError::TooManyHours {
                max: Self::MAX,
                got: value,
            });
        }
        check_scale(value).map(Self)
    }

    /// The underlying decimal.
    #[must_use]
    pub const fn get(self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Hours {
    type Error = QuantityError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Hours> for Decimal {
    fn from(hours: Hours) -> Self {
        hours.0
    }
}

impl fmt::Display for Hours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pay per hour for one tutor teaching one subject. Always
/// `0 <= rate <= HourlyRate::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct HourlyRate(Decimal);

impl HourlyRate {
    /// A zero rate.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Largest rate a `NUMERIC(10, 2)` column holds: 99,999,999.99.
    pub const MAX: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

    /// Validate and wrap a rate.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError`] if the value is negative, exceeds
    /// [`HourlyRate::MAX`], or has more than two decimal places.
    pub fn new(value: Decimal) -> Result<Self, QuantityError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(QuantityError::NegativeRate(value));
        }
        if value > Self::MAX {
            return Err(QuantityError::RateTooHigh {
                max: Self::MAX,
                got: value,
            });
        }
        check_scale(value.abs()).map(Self)
    }

    /// The underlying decimal.
    #[must_use]
    pub const fn get(self) -> Decimal {
        self.0
    }

    /// Display amount for `hours` at this rate, rounded to cents.
    #[must_use]
    pub fn amount_for(self, hours: Hours) -> Decimal {
        (self.0 * hours.0).round_dp(SCALE)
    }
}

impl TryFrom<Decimal> for HourlyRate {
    type Error = QuantityError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<HourlyRate> for Decimal {
    fn from(rate: HourlyRate) -> Self {
        rate.0
    }
}

impl fmt::Display for HourlyRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// SQLx support (with postgres feature). Both map onto NUMERIC; decoding
// re-validates so a hand-edited row cannot smuggle in a negative rate.
macro_rules! decimal_sqlx {
    ($name:ident) => {
        #[cfg(feature = "postgres")]
        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                Ok(Self::new(raw)?)
            }
        }

        #[cfg(feature = "postgres")]
        impl sqlx::Encode<'_, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

decimal_sqlx!(Hours);
decimal_sqlx!(HourlyRate);
