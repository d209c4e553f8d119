/**
 * Fixed point money amounts: four digits past the point, stored as
 * ten-thousandths in an i64.
 *
 * Parsing is strict and never panics: digits, at most one decimal
 * separator ('.' or ',') and an optional leading minus. Anything else,
 * including more than four fractional digits, is an error.
 *
 * Amounts serialize as their display string so the ledger file stays
 * readable and exact.
 */
use std::{
    fmt::{self, Display},
    ops::Neg,
    str::FromStr,
};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

const FIXED_POINT_MAGNITUDE: i64 = 10000;
const EXPECTED_PRECISION: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount contains more than one decimal separator")]
    TooManySeparators,
    #[error("amount exceeds 4 digits past the decimal point")]
    TooPrecise,
    #[error("amount contains a character that is not a digit")]
    NotANumber,
    #[error("amount is too large")]
    Overflow,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Totals saturate at the i64 bounds instead of wrapping.
    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// `self / whole` in thousandths, rounded down. Zero for a non-positive whole.
    pub fn per_mille_of(self, whole: Amount) -> i64 {
        if whole.0 <= 0 {
            return 0;
        }
        let ratio = i128::from(self.0) * 1000 / i128::from(whole.0);
        ratio.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(self.0.saturating_neg())
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let trimmed = string.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let separator = if digits.contains('.') { '.' } else { ',' };
        let split_amount: Vec<&str> = digits.split(separator).collect();
        let (units, fraction) = match split_amount.as_slice() {
            [units] => (*units, ""),
            [units, fraction] => (*units, *fraction),
            _ => return Err(AmountError::TooManySeparators),
        };

        if units.is_empty() && fraction.is_empty() {
            return Err(AmountError::Empty);
        }
        if !units
            .chars()
            .chain(fraction.chars())
            .all(|c| c.is_ascii_digit())
        {
            return Err(AmountError::NotANumber);
        }
        if fraction.len() > EXPECTED_PRECISION {
            return Err(AmountError::TooPrecise);
        }

        // All-digit strings only fail to parse on overflow.
        let units: i64 = if units.is_empty() {
            0
        } else {
            units.parse().map_err(|_| AmountError::Overflow)?
        };
        let ten_thousandths: i64 = if fraction.is_empty() {
            0
        } else {
            let decimal_multiplier = 10i64.pow((EXPECTED_PRECISION - fraction.len()) as u32);
            fraction.parse::<i64>().map_err(|_| AmountError::NotANumber)? * decimal_multiplier
        };

        let magnitude = units
            .checked_mul(FIXED_POINT_MAGNITUDE)
            .and_then(|scaled| scaled.checked_add(ten_thousandths))
            .ok_or(AmountError::Overflow)?;

        Ok(Amount(if negative { -magnitude } else { magnitude }))
    }
}

/**
 * Always at least two digits past the point, trailing zeros past that
 * are dropped: 100.00, 1.50, 1.2345, -60.00
 */
impl Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let scale = FIXED_POINT_MAGNITUDE as u64;
        let fraction = format!("{:04}", magnitude % scale);
        let fraction = fraction.trim_end_matches('0');
        write!(f, "{}{}.{:0<2}", sign, magnitude / scale, fraction)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|err| de::Error::custom(format!("invalid amount {:?}: {}", raw, err)))
    }
}
