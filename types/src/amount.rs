//! Token amount type.
//!
//! Amounts are represented as fixed-point integers (u128) scaled by the payment
//! token's decimal count, exactly as the contract emits them. The decimal count
//! is only needed for display.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

use crate::TypesError;

/// A raw token amount in the smallest unit of the payment token.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    pub fn new(raw: u128) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Scale a whole-token quantity by `decimals`.
    pub fn from_units(whole: u128, decimals: u8) -> Result<Self, TypesError> {
        10u128
            .checked_pow(decimals as u32)
            .and_then(|scale| whole.checked_mul(scale))
            .map(Self)
            .ok_or(TypesError::AmountOverflow)
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Render as a decimal string with `decimals` fractional digits, trailing
    /// zeros trimmed (`1500000` at 6 decimals → `"1.5"`).
    pub fn format_units(&self, decimals: u8) -> String {
        if decimals == 0 {
            return self.0.to_string();
        }
        let digits = self.0.to_string();
        let decimals = decimals as usize;
        let (int_part, frac_part) = if digits.len() > decimals {
            let split = digits.len() - decimals;
            (digits[..split].to_string(), digits[split..].to_string())
        } else {
            ("0".to_string(), format!("{:0>width$}", digits, width = decimals))
        };
        let frac = frac_part.trim_end_matches('0');
        if frac.is_empty() {
            int_part
        } else {
            format!("{int_part}.{frac}")
        }
    }
}

impl Add for TokenAmount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
