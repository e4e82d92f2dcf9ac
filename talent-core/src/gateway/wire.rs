//! Value encodings expected by the remote services.
//!
//! - optional fields travel as `[]` or `[value]`
//! - natural numbers travel as decimal strings (plain JSON numbers are accepted on decode)
//! - principals travel as text

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::TransportError;
use crate::models::Principal;

/// Serde adapter for `Option<T>` using the `[]` / `[value]` shape.
pub mod opt {
    use super::*;

    pub fn serialize<S, T>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        value.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr<T> {
            Wrapped(Vec<T>),
            Bare(Option<T>),
        }

        match Repr::<T>::deserialize(deserializer)? {
            Repr::Wrapped(mut items) => match items.len() {
                0 => Ok(None),
                1 => Ok(items.pop()),
                n => Err(de::Error::invalid_length(n, &"an optional of at most one value")),
            },
            Repr::Bare(value) => Ok(value),
        }
    }
}

/// Serde adapter for `u128` natural numbers.
pub mod nat {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let value = Value::deserialize(deserializer)?;
        decode_nat(&value).ok_or_else(|| de::Error::custom(format!("expected a natural number, got {value}")))
    }
}

/// Decode a natural number from either a decimal string or a JSON number.
pub fn decode_nat(value: &Value) -> Option<u128> {
    match value {
        Value::String(text) => text.replace('_', "").parse().ok(),
        Value::Number(number) => number.as_u64().map(u128::from),
        _ => None,
    }
}

pub fn encode_nat(value: u128) -> Value {
    Value::String(value.to_string())
}

pub fn encode_principal(principal: &Principal) -> Value {
    Value::String(principal.to_string())
}

pub fn encode_opt(value: Option<Value>) -> Value {
    Value::Array(value.into_iter().collect())
}

/// Encode any serializable argument record.
pub fn encode<T: Serialize>(operation: &str, value: &T) -> Result<Value, TransportError> {
    serde_json::to_value(value).map_err(|e| TransportError::malformed(operation, e))
}

/// Decode a reply payload into its typed shape.
pub fn decode<T: DeserializeOwned>(operation: &str, value: Value) -> Result<T, TransportError> {
    serde_json::from_value(value).map_err(|e| TransportError::malformed(operation, e))
}

/// A natural number carried inside other wire shapes (e.g. optional fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Nat(#[serde(with = "nat")] pub u128);

impl From<u128> for Nat {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

/// An account on a ledger: an owner plus an optional subaccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub owner: Principal,
    #[serde(default, with = "opt")]
    pub subaccount: Option<Vec<u8>>,
}

impl From<Principal> for Account {
    fn from(owner: Principal) -> Self {
        Self {
            owner,
            subaccount: None,
        }
    }
}
