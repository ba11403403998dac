use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum AddressValidationError {
    #[error("Address must be 40 hex characters long, got {0}")]
    Length(usize),
    #[error("Address contains non-hexadecimal characters")]
    NonHex,
}

/// Account address in canonical form: `0x` followed by the lowercase body.
///
/// The body is treated as opaque. Construction always normalizes, so two
/// spellings of the same address (checksummed, upper case, missing prefix)
/// compare equal and hash identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        Address(format!("0x{}", body.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Address::new(raw)
    }
}

impl From<String> for Address {
    fn from(raw: String) -> Self {
        Address::new(&raw)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Address::new(&raw))
    }
}

/// Strict check for a 20-byte hex account address, with or without `0x`.
pub fn validate_address(raw: &str) -> Result<Address, AddressValidationError> {
    let address = Address::new(raw);
    let body = &address.as_str()[2..];

    if body.len() != 40 {
        return Err(AddressValidationError::Length(body.len()));
    }
    if !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AddressValidationError::NonHex);
    }

    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address() {
        assert_eq!(
            Address::new("0xF977814e90dA44bFA03b6295A0616a897441aceC").as_str(),
            "0xf977814e90da44bfa03b6295a0616a897441acec"
        );
        assert_eq!(
            Address::new("F977814e90dA44bFA03b6295A0616a897441aceC").as_str(),
            "0xf977814e90da44bfa03b6295a0616a897441acec"
        );
        assert_eq!(Address::new("  0XABC  ").as_str(), "0xabc");
    }

    #[test]
    fn test_spellings_compare_equal() {
        assert_eq!(Address::new("0xTestAddress"), Address::new("0xtestaddress"));
        assert_eq!(Address::from("abc"), Address::from("0xABC".to_string()));
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address("0xf977814e90da44bfa03b6295a0616a897441acec").is_ok());
        assert!(validate_address("f977814e90da44bfa03b6295a0616a897441acec").is_ok());

        assert_eq!(
            validate_address("0xf977814e90da44bfa03b6295a0616a897441ace"),
            Err(AddressValidationError::Length(39))
        );
        assert_eq!(
            validate_address("0xg977814e90da44bfa03b6295a0616a897441acec"),
            Err(AddressValidationError::NonHex)
        );
    }

    #[test]
    fn test_serde_normalizes() {
        let address: Address = serde_json::from_str("\"0xABCDEF\"").unwrap();
        assert_eq!(address.as_str(), "0xabcdef");
        assert_eq!(serde_json::to_string(&address).unwrap(), "\"0xabcdef\"");
    }
}
