//! Textual principal identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const MAX_TEXT_LEN: usize = 63;
const GROUP_LEN: usize = 5;

/// An opaque, stable caller or service identifier in its textual form
/// (lowercase base32 groups of five separated by dashes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
    /// The unauthenticated caller.
    pub const ANONYMOUS: &'static str = "2vxsx-fae";
    /// The management principal, reported by a factory with no admin registered.
    pub const MANAGEMENT: &'static str = "aaaaa-aa";

    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let malformed = |message| ValidationError::MalformedPrincipal {
            text: text.to_string(),
            message,
        };

        if text.is_empty() {
            return Err(malformed("empty"));
        }
        if text.len() > MAX_TEXT_LEN {
            return Err(malformed("too long"));
        }
        if !text
            .chars()
            .all(|c| c == '-' || c.is_ascii_lowercase() || ('2'..='7').contains(&c))
        {
            return Err(malformed("expected lowercase base32 characters"));
        }

        let groups: Vec<&str> = text.split('-').collect();
        if groups.len() < 2 {
            return Err(malformed("expected dash separated groups"));
        }
        let (last, full) = groups.split_last().ok_or_else(|| malformed("empty"))?;
        if full.iter().any(|g| g.len() != GROUP_LEN) {
            return Err(malformed("groups must be five characters"));
        }
        if last.is_empty() || last.len() > GROUP_LEN {
            return Err(malformed("final group must be one to five characters"));
        }

        Ok(Self(text.to_string()))
    }

    pub fn anonymous() -> Self {
        Self(Self::ANONYMOUS.to_string())
    }

    pub fn management() -> Self {
        Self(Self::MANAGEMENT.to_string())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == Self::ANONYMOUS
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Principal {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Principal {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Principal> for String {
    fn from(value: Principal) -> Self {
        value.0
    }
}

/// Talent tokens are identified by the principal of their ledger.
pub type TokenId = Principal;

/// Faucet requests are keyed by their requester.
pub type RequestId = Principal;
