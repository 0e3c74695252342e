//! Decimal-string <-> `U256` conversion.
//!
//! Every balance, nonce and count crosses process boundaries as a base-10
//! string so that 256-bit values survive runtimes without big integers.
//! Nothing in here touches floating point.

use ethers::types::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest number of fractional digits accepted in an exchange rate.
const MAX_RATE_SCALE: usize = 36;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumericError {
    #[error("empty numeric string")]
    Empty,
    #[error("negative amounts are not allowed: {0}")]
    Negative(String),
    #[error("invalid decimal digit in {0:?}")]
    InvalidDigit(String),
    #[error("value does not fit in 256 bits: {0}")]
    Overflow(String),
    #[error("invalid exchange rate: {0}")]
    InvalidRate(String),
}

/// Parse a base-10 string into a `U256`.
pub fn parse_decimal(input: &str) -> Result<U256, NumericError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(NumericError::Empty);
    }
    if trimmed.starts_with('-') {
        return Err(NumericError::Negative(trimmed.to_string()));
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NumericError::InvalidDigit(trimmed.to_string()));
    }
    U256::from_dec_str(trimmed).map_err(|_| NumericError::Overflow(trimmed.to_string()))
}

pub fn to_decimal(value: U256) -> String {
    value.to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DecimalRepr {
    Unsigned(u64),
    Signed(i64),
    Text(String),
}

impl DecimalRepr {
    fn into_u256(self) -> Result<U256, NumericError> {
        match self {
            DecimalRepr::Unsigned(n) => Ok(U256::from(n)),
            DecimalRepr::Signed(n) => Err(NumericError::Negative(n.to_string())),
            DecimalRepr::Text(s) => parse_decimal(&s),
        }
    }
}

/// Serde adapter: `U256` as a decimal string. Also accepts JSON integers.
pub mod decimal {
    use super::*;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_decimal(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        DecimalRepr::deserialize(deserializer)?
            .into_u256()
            .map_err(de::Error::custom)
    }
}

/// Serde adapter: fixed-size `U256` arrays as lists of decimal strings.
pub mod decimal_array {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer, const N: usize>(
        values: &[U256; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(N))?;
        for value in values {
            seq.serialize_element(&to_decimal(*value))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[U256; N], D::Error> {
        let raw = Vec::<DecimalRepr>::deserialize(deserializer)?;
        if raw.len() != N {
            return Err(de::Error::invalid_length(raw.len(), &"a fixed-size array"));
        }
        let mut out = [U256::zero(); N];
        for (slot, repr) in out.iter_mut().zip(raw) {
            *slot = repr.into_u256().map_err(de::Error::custom)?;
        }
        Ok(out)
    }
}

/// Decimal fixed-point exchange rate, in token base units per wei.
///
/// `"5"` means one wei buys five tokens; `"0.25"` means four wei buy one
/// token. Stored as `mantissa / 10^scale`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExchangeRate {
    mantissa: U256,
    scale: usize,
}

impl ExchangeRate {
    pub fn from_integer(rate: u64) -> Result<Self, NumericError> {
        if rate == 0 {
            return Err(NumericError::InvalidRate("0".to_string()));
        }
        Ok(Self {
            mantissa: U256::from(rate),
            scale: 0,
        })
    }

    /// Tokens bought by selling `wei`. `None` on overflow.
    pub fn wei_to_tokens(&self, wei: U256) -> Option<U256> {
        wei.checked_mul(self.mantissa)
            .map(|scaled| scaled / U256::exp10(self.scale))
    }

    /// Wei bought by selling `tokens`, rounded down. `None` on overflow.
    pub fn tokens_to_wei(&self, tokens: U256) -> Option<U256> {
        tokens
            .checked_mul(U256::exp10(self.scale))
            .map(|scaled| scaled / self.mantissa)
    }
}

impl FromStr for ExchangeRate {
    type Err = NumericError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.starts_with('-') {
            return Err(NumericError::Negative(trimmed.to_string()));
        }
        let (whole, fraction) = match trimmed.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (trimmed, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(NumericError::Empty);
        }
        if fraction.len() > MAX_RATE_SCALE {
            return Err(NumericError::InvalidRate(trimmed.to_string()));
        }
        let digits = format!("{}{}", whole, fraction);
        let mantissa = parse_decimal(&digits)?;
        if mantissa.is_zero() {
            return Err(NumericError::InvalidRate(trimmed.to_string()));
        }
        Ok(Self {
            mantissa,
            scale: fraction.len(),
        })
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.to_string();
        if self.scale == 0 {
            return f.write_str(&digits);
        }
        let padded = format!("{:0>width$}", digits, width = self.scale + 1);
        let (whole, fraction) = padded.split_at(padded.len() - self.scale);
        write!(f, "{}.{}", whole, fraction)
    }
}

impl Serialize for ExchangeRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ExchangeRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match DecimalRepr::deserialize(deserializer)? {
            DecimalRepr::Unsigned(n) => ExchangeRate::from_integer(n).map_err(de::Error::custom),
            DecimalRepr::Signed(n) => Err(de::Error::custom(NumericError::Negative(n.to_string()))),
            DecimalRepr::Text(s) => s.parse().map_err(de::Error::custom),
        }
    }
}
