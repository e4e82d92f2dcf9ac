//! Talent token records and creation arguments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{Principal, TokenId};
use crate::gateway::wire::{nat, opt};

/// Arguments for creating a talent token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TokenSpec {
    #[validate(length(min = 1, max = 32))]
    pub name: String,
    #[validate(length(min = 1, max = 8))]
    pub symbol: String,
    #[validate(range(max = 18))]
    pub decimals: u8,
    #[validate(range(min = 1))]
    pub total_supply: u64,
    /// Price of one whole token, in platform ledger base units.
    #[validate(range(min = 1))]
    pub unit_price: u64,
    #[serde(default, with = "opt")]
    #[validate(url)]
    pub logo: Option<String>,
}

/// Metadata recorded by the factory for each token it created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: u64,
    pub owner: Principal,
    #[serde(default, with = "opt")]
    pub logo: Option<String>,
    /// Creation time in nanoseconds since the Unix epoch.
    pub created: u64,
    pub unit_price: u64,
}

impl TokenMetadata {
    /// `None` when the timestamp lies beyond what `DateTime` can hold.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.created)
            .ok()
            .map(DateTime::from_timestamp_nanos)
    }
}

/// A token together with its ledger identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TalentToken {
    pub id: TokenId,
    pub metadata: TokenMetadata,
}

/// One line of a balance report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token_id: TokenId,
    pub holder: Principal,
    #[serde(with = "nat")]
    pub amount: u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TokenSpec {
        TokenSpec {
            name: "Ada Hours".to_string(),
            symbol: "ADA".to_string(),
            decimals: 8,
            total_supply: 1_000_000,
            unit_price: 3,
            logo: None,
        }
    }

    #[test]
    fn test_valid_spec() {
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn test_spec_bounds() {
        let mut bad = spec();
        bad.symbol = "TOOLONGSYM".to_string();
        bad.decimals = 30;
        bad.logo = Some("not a url".to_string());
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("symbol"));
        assert!(fields.contains_key("decimals"));
        assert!(fields.contains_key("logo"));
    }

    fn metadata(created: u64) -> TokenMetadata {
        TokenMetadata {
            name: "n".into(),
            symbol: "s".into(),
            decimals: 0,
            total_supply: 1,
            owner: Principal::management(),
            logo: None,
            created,
            unit_price: 1,
        }
    }

    #[test]
    fn test_created_at_from_nanos() {
        let created = metadata(1_700_000_000_000_000_000).created_at().unwrap();
        assert_eq!(created.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_created_at_out_of_range() {
        assert_eq!(metadata(u64::MAX).created_at(), None);
        assert!(metadata(i64::MAX as u64).created_at().is_some());
    }

    #[test]
    fn test_metadata_without_price_does_not_decode() {
        let json = serde_json::json!({
            "name": "Ada Hours",
            "symbol": "ADA",
            "decimals": 8,
            "total_supply": 10,
            "owner": "aaaaa-aa",
            "logo": [],
            "created": 0
        });
        let err = serde_json::from_value::<TokenMetadata>(json).unwrap_err();
        assert!(err.to_string().contains("unit_price"));
    }
}
