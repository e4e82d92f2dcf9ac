//! Fungible-token ledger proxy (allowance-based transfer protocol).
//!
//! The same proxy addresses the platform ledger and every per-token ledger;
//! only the endpoint differs.

use serde::{Deserialize, Serialize};

use super::wire::{self, Account, Nat, opt};
use super::{ServiceEndpoint, ServiceGateway};
use crate::error::ServiceError;
use crate::models::Principal;

/// Arguments of an allowance grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveArgs {
    #[serde(default, with = "opt")]
    pub from_subaccount: Option<Vec<u8>>,
    pub spender: Account,
    pub amount: Nat,
    #[serde(default, with = "opt")]
    pub expected_allowance: Option<Nat>,
    /// Nanoseconds since the Unix epoch.
    #[serde(default, with = "opt")]
    pub expires_at: Option<u64>,
    #[serde(default, with = "opt")]
    pub fee: Option<Nat>,
    #[serde(default, with = "opt")]
    pub memo: Option<Vec<u8>>,
    #[serde(default, with = "opt")]
    pub created_at_time: Option<u64>,
}

impl ApproveArgs {
    pub fn new(spender: Principal, amount: u128, expires_at: Option<u64>) -> Self {
        Self {
            from_subaccount: None,
            spender: Account::from(spender),
            amount: Nat(amount),
            expected_allowance: None,
            expires_at,
            fee: None,
            memo: None,
            created_at_time: None,
        }
    }
}

/// Arguments of a caller-signed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferArgs {
    #[serde(default, with = "opt")]
    pub from_subaccount: Option<Vec<u8>>,
    pub to: Account,
    pub amount: Nat,
    #[serde(default, with = "opt")]
    pub fee: Option<Nat>,
    #[serde(default, with = "opt")]
    pub memo: Option<Vec<u8>>,
    #[serde(default, with = "opt")]
    pub created_at_time: Option<u64>,
}

impl TransferArgs {
    pub fn new(to: Principal, amount: u128) -> Self {
        Self {
            from_subaccount: None,
            to: Account::from(to),
            amount: Nat(amount),
            fee: None,
            memo: None,
            created_at_time: None,
        }
    }
}

#[derive(Serialize)]
struct AllowanceArgs {
    account: Account,
    spender: Account,
}

#[derive(Deserialize)]
struct Allowance {
    allowance: Nat,
}

/// Typed access to a ledger.
#[derive(Clone)]
pub struct LedgerService {
    gateway: ServiceGateway,
    endpoint: ServiceEndpoint,
}

impl LedgerService {
    pub fn new(gateway: ServiceGateway, endpoint: ServiceEndpoint) -> Self {
        Self { gateway, endpoint }
    }

    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Grant (or replace) an allowance. Returns the ledger block index.
    pub async fn approve_allowance(&self, args: &ApproveArgs) -> Result<u128, ServiceError> {
        let encoded = vec![wire::encode("icrc2_approve", args)?];
        let Nat(block) = self
            .gateway
            .call_as(&self.endpoint, "icrc2_approve", encoded)
            .await?;
        Ok(block)
    }

    /// Transfer from the caller's own account. Returns the ledger block index.
    pub async fn transfer(&self, args: &TransferArgs) -> Result<u128, ServiceError> {
        let encoded = vec![wire::encode("icrc1_transfer", args)?];
        let Nat(block) = self
            .gateway
            .call_as(&self.endpoint, "icrc1_transfer", encoded)
            .await?;
        Ok(block)
    }

    pub async fn balance_of(&self, owner: &Principal) -> Result<u128, ServiceError> {
        let encoded = vec![wire::encode("icrc1_balance_of", &Account::from(owner.clone()))?];
        let Nat(balance) = self
            .gateway
            .query_as(&self.endpoint, "icrc1_balance_of", encoded)
            .await?;
        Ok(balance)
    }

    /// Outstanding allowance `owner` has granted to `spender`.
    pub async fn allowance(&self, owner: &Principal, spender: &Principal) -> Result<u128, ServiceError> {
        let args = AllowanceArgs {
            account: Account::from(owner.clone()),
            spender: Account::from(spender.clone()),
        };
        let encoded = vec![wire::encode("icrc2_allowance", &args)?];
        let reply: Allowance = self
            .gateway
            .query_as(&self.endpoint, "icrc2_allowance", encoded)
            .await?;
        Ok(reply.allowance.0)
    }
}
