//! Numeric quantities as they appear on the JSON-RPC wire.
//!
//! Heights and gas figures fit in `u64`; monetary amounts do not, so they are
//! carried as 256-bit integers and never narrowed.

use primitive_types::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum QuantityError {
    #[error("Empty quantity")]
    Empty,
    #[error("Failed to parse hex quantity '{0}'")]
    InvalidHex(String),
    #[error("Failed to parse decimal quantity '{0}'")]
    InvalidDecimal(String),
}

/// Parse a hex quantity such as `"0x5BAD55"` into a `u64`.
///
/// The `0x` prefix is optional and digits are case-insensitive.
pub fn parse_hex_u64(hex_str: &str) -> Result<u64, QuantityError> {
    let digits = strip_hex_prefix(hex_str.trim());
    if digits.is_empty() {
        return Err(QuantityError::Empty);
    }
    u64::from_str_radix(digits, 16).map_err(|_| QuantityError::InvalidHex(hex_str.to_string()))
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

const ETHER_DECIMALS: usize = 18;

/// Arbitrary-size amount (value, gas price) in the chain's smallest unit.
///
/// Serializes as a `0x` hex string, the same form the node uses. `Display`
/// renders decimal for humans and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Wei(pub U256);

impl Wei {
    pub const ZERO: Wei = Wei(U256::zero());

    pub fn from_hex(hex_str: &str) -> Result<Self, QuantityError> {
        let digits = strip_hex_prefix(hex_str.trim());
        if digits.is_empty() {
            return Err(QuantityError::Empty);
        }
        U256::from_str_radix(digits, 16)
            .map(Wei)
            .map_err(|_| QuantityError::InvalidHex(hex_str.to_string()))
    }

    pub fn from_dec_str(dec_str: &str) -> Result<Self, QuantityError> {
        let trimmed = dec_str.trim();
        if trimmed.is_empty() {
            return Err(QuantityError::Empty);
        }
        U256::from_dec_str(trimmed)
            .map(Wei)
            .map_err(|_| QuantityError::InvalidDecimal(dec_str.to_string()))
    }

    /// Hex when prefixed with `0x`, decimal otherwise.
    pub fn parse(s: &str) -> Result<Self, QuantityError> {
        let trimmed = s.trim();
        if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
            Self::from_hex(trimmed)
        } else {
            Self::from_dec_str(trimmed)
        }
    }

    pub fn to_hex(&self) -> String {
        format!("0x{:x}", self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Exact ether amount with all 18 decimal places, e.g. `1.500000000000000000`
    pub fn to_ether_string(&self) -> String {
        let unit = U256::exp10(ETHER_DECIMALS);
        let whole = self.0 / unit;
        // Always below 10^18, so it fits in u64
        let fraction = (self.0 % unit).as_u64();
        format!("{}.{:0width$}", whole, fraction, width = ETHER_DECIMALS)
    }
}

impl From<u64> for Wei {
    fn from(v: u64) -> Self {
        Wei(U256::from(v))
    }
}

impl From<u128> for Wei {
    fn from(v: u128) -> Self {
        Wei(U256::from(v))
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for Wei {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WeiVisitor;

        impl<'de> de::Visitor<'de> for WeiVisitor {
            type Value = Wei;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a hex string starting with 0x, a decimal string or a number")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Wei, E> {
                Wei::parse(value).map_err(de::Error::custom)
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Wei, E> {
                Ok(Wei::from(value))
            }
        }

        deserializer.deserialize_any(WeiVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_block_height() {
        assert_eq!(parse_hex_u64("0x5BAD55").unwrap(), 6008149);
        assert_eq!(parse_hex_u64("0x5bad55").unwrap(), 6008149);
        assert_eq!(parse_hex_u64("1234").unwrap(), 0x1234);
        assert_eq!(parse_hex_u64("0x0").unwrap(), 0);
    }

    #[test]
    fn test_parse_hex_u64_rejects_garbage() {
        assert_eq!(parse_hex_u64("0x"), Err(QuantityError::Empty));
        assert!(matches!(parse_hex_u64("invalid"), Err(QuantityError::InvalidHex(_))));
        // 17 hex digits overflow u64
        assert!(parse_hex_u64("0x10000000000000000").is_err());
    }

    #[test]
    fn test_wei_beyond_u64_is_exact() {
        // 1000 ether, well past u64::MAX
        let wei = Wei::from_hex("0x3635c9adc5dea00000").unwrap();
        assert_eq!(wei.to_string(), "1000000000000000000000");
        assert_eq!(wei.to_hex(), "0x3635c9adc5dea00000");
        assert_eq!(Wei::from_dec_str("1000000000000000000000").unwrap(), wei);
    }

    #[test]
    fn test_wei_max_and_overflow() {
        let max = Wei::from_hex(&format!("0x{}", "f".repeat(64))).unwrap();
        assert_eq!(max, Wei(U256::MAX));
        assert!(Wei::from_hex(&format!("0x1{}", "0".repeat(64))).is_err());
    }

    #[test]
    fn test_wei_serde() {
        let wei: Wei = serde_json::from_str("\"0xde0b6b3a7640000\"").unwrap();
        assert_eq!(wei.to_string(), "1000000000000000000");
        assert_eq!(serde_json::to_string(&wei).unwrap(), "\"0xde0b6b3a7640000\"");

        let from_number: Wei = serde_json::from_str("255").unwrap();
        assert_eq!(from_number, Wei::from(255u64));

        let from_decimal: Wei = serde_json::from_str("\"255\"").unwrap();
        assert_eq!(from_decimal.to_hex(), "0xff");
    }

    #[test]
    fn test_wei_to_ether_string() {
        assert_eq!(Wei::ZERO.to_ether_string(), "0.000000000000000000");
        assert_eq!(Wei::from(1u64).to_ether_string(), "0.000000000000000001");
        assert_eq!(
            Wei::from_hex("0x14d1120d7b160000").unwrap().to_ether_string(),
            "1.500000000000000000"
        );
        assert_eq!(
            Wei::from_dec_str("123456789012345678901234567890").unwrap().to_ether_string(),
            "123456789012.345678901234567890"
        );
        // Far beyond f64 precision, still exact
        let max = Wei(U256::MAX).to_ether_string();
        assert!(max.starts_with("115792089237316195423570985008687907853269984665640564039457"));
        assert!(max.ends_with(".584007913129639935"));
    }

    #[test]
    fn test_wei_zero() {
        assert!(Wei::ZERO.is_zero());
        assert_eq!(Wei::from_hex("0x0").unwrap().to_hex(), "0x0");
    }
}
