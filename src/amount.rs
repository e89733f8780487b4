use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AmountError {
    /// Unable to parse decimal string.
    #[error("Unable to parse decimal string")]
    Decimal(#[from] rust_decimal::Error),

    /// Deposits must add value.
    #[error("Amount must be greater than zero, found {0}")]
    NotPositive(Amount),

    #[error("Amount {0} has more than {MAX_DEPOSIT_SCALE} fractional digits")]
    Scale(Amount),

    #[error("Amount {0} has more than {MAX_DEPOSIT_INTEGER_DIGITS} integer digits")]
    TooLarge(Amount),
}

/// Fractional digits allowed in a deposit.
pub const MAX_DEPOSIT_SCALE: u32 = 8;

/// Integer digits allowed in a deposit.
///
/// Together with [`MAX_DEPOSIT_SCALE`] this matches a `DECIMAL(20, 8)` column. Running totals keep
/// all eight fractional digits until they reach 20 integer digits, well past any sum of deposits.
pub const MAX_DEPOSIT_INTEGER_DIGITS: u32 = 12;

/// Exact decimal quantity of money.
///
/// Used for running totals, so zero is a valid value. Deposits use [`DepositAmount`] which is
/// guaranteed to be strictly positive.
///
/// `Decimal` has no representation for infinity or NaN, so every `Amount` is finite.
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Amount(Decimal);

/// A strictly positive [`Amount`] accepted by the ledger.
#[derive(Copy, Clone, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "Amount", into = "Amount")]
pub struct DepositAmount(Amount);

macro_rules! impl_math_ops {
    ($name:ident) => {
        impl ::std::ops::Add for $name {
            type Output = Self;

            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl ::std::ops::AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }
    };
}

impl_math_ops!(Amount);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn to_decimal(self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Exact addition.
    ///
    /// Returns `None` when the sum does not fit, including when `Decimal` would have to round away
    /// fractional digits to represent it.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        let sum = self.0.checked_add(rhs.0)?;

        (sum.scale() >= self.0.scale().max(rhs.0.scale())).then_some(Self(sum))
    }

    /// Canonical text form used for storage.
    ///
    /// Trailing zeros are removed so that equal values always produce equal strings.
    pub fn to_canonical(self) -> String {
        self.0.normalize().to_string()
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<DepositAmount> for Amount {
    fn from(value: DepositAmount) -> Self {
        value.0
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // `Decimal::from_str` silently rounds digits beyond its precision.
        Ok(Self(Decimal::from_str_exact(s.trim())?))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Totals are printed without the scale they were stored with; `15.00` and `15` are the
        // same amount of money.
        write!(f, "{}", self.0.normalize())
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, amount| acc + amount)
    }
}

impl DepositAmount {
    pub fn new(amount: Amount) -> Result<Self, AmountError> {
        let value = amount.0.normalize();
        if !value.is_sign_positive() || value.is_zero() {
            Err(AmountError::NotPositive(amount))
        } else if value.scale() > MAX_DEPOSIT_SCALE {
            Err(AmountError::Scale(amount))
        } else if value >= Decimal::from(10_i64.pow(MAX_DEPOSIT_INTEGER_DIGITS)) {
            Err(AmountError::TooLarge(amount))
        } else {
            Ok(Self(amount))
        }
    }

    pub fn amount(self) -> Amount {
        self.0
    }
}

impl TryFrom<Amount> for DepositAmount {
    type Error = AmountError;

    fn try_from(value: Amount) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<Decimal> for DepositAmount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(Amount(value))
    }
}

impl FromStr for DepositAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.parse()?)
    }
}

impl fmt::Display for DepositAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
