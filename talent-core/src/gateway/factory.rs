//! Token factory service proxy.
//!
//! Provides typed access to admin management, the faucet request queue, token
//! creation and purchase, and module upgrades.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::wire::Nat;
use super::{ServiceEndpoint, ServiceGateway, wire};
use crate::error::ServiceError;
use crate::models::{FaucetRequest, Principal, RequestStatus, TalentToken, TokenId, TokenMetadata, TokenSpec};

/// Faucet record as the factory stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetTokenRequest {
    #[serde(with = "wire::nat")]
    pub current_token_request: u128,
    pub total_number_of_request: u32,
    #[serde(with = "wire::nat")]
    pub total_token_given: u128,
    /// Older factories do not record a status; absence means pending.
    #[serde(default, with = "wire::opt")]
    pub status: Option<RequestStatus>,
}

impl FaucetTokenRequest {
    pub fn into_request(self, requester: Principal) -> FaucetRequest {
        FaucetRequest {
            requester,
            current_amount_requested: self.current_token_request,
            total_requests_count: self.total_number_of_request,
            total_amount_granted: self.total_token_given,
            status: self.status.unwrap_or(RequestStatus::Pending),
        }
    }
}

/// Typed access to the token factory.
#[derive(Clone)]
pub struct FactoryService {
    gateway: ServiceGateway,
    endpoint: ServiceEndpoint,
}

impl FactoryService {
    pub fn new(gateway: ServiceGateway) -> Self {
        Self {
            gateway,
            endpoint: ServiceEndpoint::Factory,
        }
    }

    // =========================================================================
    // Admin Management
    // =========================================================================

    pub async fn get_admin(&self) -> Result<Principal, ServiceError> {
        self.gateway.call_as(&self.endpoint, "get_admin", vec![]).await
    }

    pub async fn register_admin(&self) -> Result<String, ServiceError> {
        self.gateway
            .call_as(&self.endpoint, "register_admin", vec![])
            .await
    }

    pub async fn change_admin(&self, new_admin: &Principal) -> Result<String, ServiceError> {
        let args = vec![wire::encode_principal(new_admin)];
        self.gateway.call_as(&self.endpoint, "change_admin", args).await
    }

    /// Point the factory at the platform ledger it charges fees on.
    pub async fn set_token_canister(&self, ledger: &Principal) -> Result<String, ServiceError> {
        let args = vec![wire::encode_principal(ledger)];
        self.gateway
            .call_as(&self.endpoint, "set_token_canister", args)
            .await
    }

    /// Replace the module installed for newly created token ledgers.
    pub async fn update_upgrade_module(&self, module: &[u8]) -> Result<String, ServiceError> {
        let args = vec![Value::String(STANDARD.encode(module))];
        self.gateway
            .call_as(&self.endpoint, "update_wasm_module", args)
            .await
    }

    // =========================================================================
    // Faucet Requests
    // =========================================================================

    /// The full queue; admin only.
    pub async fn list_faucet_requests(&self) -> Result<Vec<FaucetRequest>, ServiceError> {
        let entries: Vec<(Principal, FaucetTokenRequest)> = self
            .gateway
            .call_as(&self.endpoint, "get_faucet_requests", vec![])
            .await?;
        Ok(entries
            .into_iter()
            .map(|(requester, record)| record.into_request(requester))
            .collect())
    }

    /// The caller's own record, if any.
    pub async fn caller_faucet_request(
        &self,
        caller: &Principal,
    ) -> Result<Option<FaucetRequest>, ServiceError> {
        let record: Option<FaucetTokenRequest> = wire::decode(
            "get_caller_faucet_request",
            wire_opt(
                self.gateway
                    .call(&self.endpoint, "get_caller_faucet_request", vec![])
                    .await?,
            ),
        )?;
        Ok(record.map(|r| r.into_request(caller.clone())))
    }

    pub async fn submit_faucet_request(&self, amount: u128) -> Result<String, ServiceError> {
        let args = vec![wire::encode_nat(amount)];
        self.gateway
            .call_as(&self.endpoint, "send_token_faucet_request", args)
            .await
    }

    pub async fn approve_faucet_request(&self, requester: &Principal) -> Result<String, ServiceError> {
        let args = vec![wire::encode_principal(requester)];
        self.gateway
            .call_as(&self.endpoint, "accept_token_request", args)
            .await
    }

    pub async fn reject_faucet_request(&self, requester: &Principal) -> Result<String, ServiceError> {
        let args = vec![wire::encode_principal(requester)];
        self.gateway
            .call_as(&self.endpoint, "reject_token_request", args)
            .await
    }

    // =========================================================================
    // Tokens
    // =========================================================================

    pub async fn create_token(&self, spec: &TokenSpec) -> Result<TokenId, ServiceError> {
        let args = vec![wire::encode("create_talent_token_canister", spec)?];
        self.gateway
            .call_as(&self.endpoint, "create_talent_token_canister", args)
            .await
    }

    pub async fn list_tokens(&self) -> Result<Vec<TalentToken>, ServiceError> {
        let entries: Vec<(TokenId, TokenMetadata)> = self
            .gateway
            .call_as(&self.endpoint, "get_list_of_tokens", vec![])
            .await?;
        Ok(entries
            .into_iter()
            .map(|(id, metadata)| TalentToken { id, metadata })
            .collect())
    }

    pub async fn get_token_metadata(&self, token_id: &TokenId) -> Result<TokenMetadata, ServiceError> {
        let args = vec![wire::encode_principal(token_id)];
        self.gateway
            .call_as(&self.endpoint, "get_token_metadata", args)
            .await
    }

    /// The token created by the caller.
    pub async fn get_user_token_metadata(&self) -> Result<TalentToken, ServiceError> {
        let (id, metadata): (TokenId, TokenMetadata) = self
            .gateway
            .call_as(&self.endpoint, "get_user_token_metadata", vec![])
            .await?;
        Ok(TalentToken { id, metadata })
    }

    pub async fn buy_token(&self, token_id: &TokenId, quantity: u128) -> Result<String, ServiceError> {
        let args = vec![wire::encode_principal(token_id), wire::encode_nat(quantity)];
        self.gateway
            .call_as(&self.endpoint, "buy_talent_token", args)
            .await
    }

    /// Tokens the caller has held, with the factory's view of each amount.
    pub async fn list_all_balances_for_caller(&self) -> Result<Vec<(TokenId, u128)>, ServiceError> {
        let entries: Vec<(TokenId, Nat)> = self
            .gateway
            .call_as(&self.endpoint, "get_all_balances_for_caller", vec![])
            .await?;
        Ok(entries.into_iter().map(|(id, Nat(amount))| (id, amount)).collect())
    }
}

/// Normalise an optional payload (`[]`, `[x]` or `null`) to JSON `null` / `x`.
fn wire_opt(value: Value) -> Value {
    match value {
        Value::Array(mut items) if items.len() <= 1 => items.pop().unwrap_or(Value::Null),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_faucet_record_defaults_to_pending() {
        let record: FaucetTokenRequest = serde_json::from_value(json!({
            "current_token_request": 50,
            "total_number_of_request": 1,
            "total_token_given": "0"
        }))
        .unwrap();
        let requester = Principal::parse("2vxsx-fae").unwrap();
        let request = record.into_request(requester.clone());
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.current_amount_requested, 50);
        assert_eq!(request.requester, requester);
    }

    #[test]
    fn test_faucet_record_with_status() {
        let record: FaucetTokenRequest = serde_json::from_value(json!({
            "current_token_request": "10",
            "total_number_of_request": 2,
            "total_token_given": "10",
            "status": ["Approved"]
        }))
        .unwrap();
        assert_eq!(record.status, Some(RequestStatus::Approved));
    }

    #[test]
    fn test_wire_opt_normalisation() {
        assert_eq!(wire_opt(json!([])), Value::Null);
        assert_eq!(wire_opt(json!([{ "a": 1 }])), json!({ "a": 1 }));
        assert_eq!(wire_opt(json!({ "a": 1 })), json!({ "a": 1 }));
    }
}
