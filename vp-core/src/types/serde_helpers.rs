//! Serde adapters for chain primitives
//!
//! Quantities serialize as decimal strings and addresses as lowercase hex so
//! stored rows and API payloads stay readable and case-normalized.

use crate::{Address, U256};

/// Lowercase `0x`-prefixed hex for an address
pub fn address_to_lower_hex(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// `U256` as a decimal string
pub mod u256_dec {
    use super::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_str_radix(&s, 10).map_err(|e| D::Error::custom(format!("invalid uint256 {s}: {e}")))
    }
}

/// `Option<U256>` as an optional decimal string
pub mod u256_dec_opt {
    use super::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<U256>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| {
                U256::from_str_radix(&s, 10)
                    .map_err(|e| D::Error::custom(format!("invalid uint256 {s}: {e}")))
            })
            .transpose()
    }
}

/// `Address` as lowercase hex
pub mod address_hex {
    use super::{address_to_lower_hex, Address};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(value: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&address_to_lower_hex(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(|e| D::Error::custom(format!("invalid address {s}: {e}")))
    }
}

/// `Option<Address>` as optional lowercase hex
pub mod address_hex_opt {
    use super::{address_to_lower_hex, Address};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(value: &Option<Address>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&address_to_lower_hex(v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Address>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| {
                Address::from_str(&s).map_err(|e| D::Error::custom(format!("invalid address {s}: {e}")))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        #[serde(with = "address_hex")]
        user: Address,
        #[serde(with = "u256_dec")]
        amount: U256,
        #[serde(with = "u256_dec_opt")]
        previous: Option<U256>,
    }

    #[test]
    fn test_address_serializes_lowercase() {
        let row = Row {
            user: Address::repeat_byte(0xAB),
            amount: U256::from(1000u64),
            previous: None,
        };
        let json = serde_json::to_string(&row).unwrap();
        assert!(json.contains("0xabababababababababababababababababababab"));
        assert!(json.contains("\"amount\":\"1000\""));
    }

    #[test]
    fn test_u256_beyond_u128_survives_json() {
        let big = U256::MAX - U256::from(7u64);
        let row = Row {
            user: Address::ZERO,
            amount: big,
            previous: Some(U256::from(42u64)),
        };
        let json = serde_json::to_string(&row).unwrap();
        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn test_rejects_hex_amount() {
        let json = r#"{"user":"0x0000000000000000000000000000000000000000","amount":"0x10","previous":null}"#;
        assert!(serde_json::from_str::<Row>(json).is_err());
    }
}
