//! In-memory marketplace: profile store, token factory, platform ledger and
//! per-token ledgers with allowance semantics, served through the gateway
//! `Transport` so the client runs unmodified against it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use talent_core::error::TransportError;
use talent_core::gateway::wire::{Account, Nat};
use talent_core::gateway::{ApproveArgs, FaucetTokenRequest, ServiceEndpoint, Transport, TransferArgs};
use talent_core::models::{Principal, Profile, RequestStatus, TokenId, TokenMetadata, TokenSpec};

/// Fee charged by the factory for creating a token.
pub const CREATION_FEE: u128 = 100;

const BASE32: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// A deterministic, well-formed principal for test identities.
pub fn test_principal(n: u32) -> Principal {
    let mut group = String::with_capacity(5);
    let mut rest = n;
    for _ in 0..5 {
        group.insert(0, BASE32[(rest % 32) as usize] as char);
        rest /= 32;
    }
    // Valid by construction: five base32 characters per group.
    Principal::parse(&format!("{}-tests-aaaaa-aaaaa-cai", group))
        .unwrap_or_else(|_| Principal::anonymous())
}

/// Injected failure for a method.
#[derive(Debug, Clone)]
pub enum Fault {
    Unreachable,
    Timeout,
    /// Answer `{"Err": payload}`.
    Reject(Value),
}

/// One call as the marketplace received it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub caller: Principal,
    pub endpoint: String,
    pub method: String,
    pub args: Value,
}

#[derive(Debug, Clone, Copy)]
struct Allowance {
    amount: u128,
    expires_at: Option<u64>,
}

#[derive(Debug)]
enum LedgerReject {
    InsufficientFunds { balance: u128 },
    InsufficientAllowance { allowance: u128 },
    Expired { ledger_time: u64 },
}

impl LedgerReject {
    fn to_value(&self) -> Value {
        match self {
            LedgerReject::InsufficientFunds { balance } => {
                json!({ "InsufficientFunds": { "balance": balance.to_string() } })
            }
            LedgerReject::InsufficientAllowance { allowance } => {
                json!({ "InsufficientAllowance": { "allowance": allowance.to_string() } })
            }
            LedgerReject::Expired { ledger_time } => {
                json!({ "Expired": { "ledger_time": ledger_time } })
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            LedgerReject::InsufficientFunds { balance } => {
                format!("InsufficientFunds {{ balance: {} }}", balance)
            }
            LedgerReject::InsufficientAllowance { allowance } => {
                format!("InsufficientAllowance {{ allowance: {} }}", allowance)
            }
            LedgerReject::Expired { ledger_time } => {
                format!("Expired {{ ledger_time: {} }}", ledger_time)
            }
        }
    }
}

#[derive(Debug, Default)]
struct FakeLedger {
    balances: HashMap<Principal, u128>,
    allowances: HashMap<(Principal, Principal), Allowance>,
    blocks: u128,
}

impl FakeLedger {
    fn next_block(&mut self) -> u128 {
        self.blocks += 1;
        self.blocks
    }

    fn balance(&self, owner: &Principal) -> u128 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &Principal, spender: &Principal, now: u64) -> u128 {
        match self.allowances.get(&(owner.clone(), spender.clone())) {
            Some(a) if a.expires_at.map_or(true, |at| at > now) => a.amount,
            _ => 0,
        }
    }

    fn mint(&mut self, to: &Principal, amount: u128) {
        *self.balances.entry(to.clone()).or_default() += amount;
        self.next_block();
    }

    fn approve(
        &mut self,
        owner: &Principal,
        spender: &Principal,
        amount: u128,
        expires_at: Option<u64>,
        now: u64,
    ) -> Result<u128, LedgerReject> {
        if expires_at.is_some_and(|at| at <= now) {
            return Err(LedgerReject::Expired { ledger_time: now });
        }
        self.allowances
            .insert((owner.clone(), spender.clone()), Allowance { amount, expires_at });
        Ok(self.next_block())
    }

    fn transfer(&mut self, from: &Principal, to: &Principal, amount: u128) -> Result<u128, LedgerReject> {
        let balance = self.balance(from);
        if balance < amount {
            return Err(LedgerReject::InsufficientFunds { balance });
        }
        self.balances.insert(from.clone(), balance - amount);
        *self.balances.entry(to.clone()).or_default() += amount;
        Ok(self.next_block())
    }

    fn transfer_from(
        &mut self,
        spender: &Principal,
        from: &Principal,
        to: &Principal,
        amount: u128,
        now: u64,
    ) -> Result<u128, LedgerReject> {
        let allowance = self.allowance(from, spender, now);
        if allowance < amount {
            return Err(LedgerReject::InsufficientAllowance { allowance });
        }
        let block = self.transfer(from, to, amount)?;
        if let Some(entry) = self.allowances.get_mut(&(from.clone(), spender.clone())) {
            entry.amount -= amount;
        }
        Ok(block)
    }
}

#[derive(Default)]
struct MarketState {
    profiles: BTreeMap<Principal, Profile>,
    admin: Option<Principal>,
    token_canister: Option<Principal>,
    module: Vec<u8>,
    faucet: BTreeMap<Principal, FaucetTokenRequest>,
    tokens: BTreeMap<TokenId, TokenMetadata>,
    owners: HashMap<Principal, TokenId>,
    platform: FakeLedger,
    token_ledgers: HashMap<TokenId, FakeLedger>,
    holdings: BTreeMap<Principal, BTreeMap<TokenId, u128>>,
    calls: Vec<RecordedCall>,
    faults: HashMap<String, Fault>,
    next_token: u32,
}

/// Shared handle to the in-memory marketplace.
#[derive(Clone)]
pub struct FakeMarketplace {
    state: Arc<Mutex<MarketState>>,
    factory: Principal,
}

impl FakeMarketplace {
    /// Create an empty marketplace whose factory runs as `factory`.
    pub fn new(factory: Principal) -> Self {
        Self {
            state: Arc::new(Mutex::new(MarketState::default())),
            factory,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MarketState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A transport that authenticates every call as `caller`.
    pub fn connect_as(&self, caller: &Principal) -> Arc<dyn Transport> {
        Arc::new(MarketConnection {
            market: self.clone(),
            caller: caller.clone(),
        })
    }

    pub fn factory_principal(&self) -> &Principal {
        &self.factory
    }

    // =========================================================================
    // Seeding and Inspection
    // =========================================================================

    /// Credit platform currency to `to`.
    pub fn mint(&self, to: &Principal, amount: u128) {
        self.lock().platform.mint(to, amount);
    }

    pub fn platform_balance(&self, owner: &Principal) -> u128 {
        self.lock().platform.balance(owner)
    }

    pub fn platform_allowance(&self, owner: &Principal, spender: &Principal) -> u128 {
        self.lock().platform.allowance(owner, spender, now_nanos())
    }

    pub fn token_balance(&self, token_id: &TokenId, owner: &Principal) -> u128 {
        self.lock()
            .token_ledgers
            .get(token_id)
            .map(|ledger| ledger.balance(owner))
            .unwrap_or(0)
    }

    pub fn admin(&self) -> Option<Principal> {
        self.lock().admin.clone()
    }

    pub fn token_canister(&self) -> Option<Principal> {
        self.lock().token_canister.clone()
    }

    pub fn module(&self) -> Vec<u8> {
        self.lock().module.clone()
    }

    pub fn faucet_status(&self, requester: &Principal) -> Option<RequestStatus> {
        self.lock()
            .faucet
            .get(requester)
            .map(|r| r.status.unwrap_or(RequestStatus::Pending))
    }

    /// Make every call matching `key` (`method` or `endpoint/method`) fail.
    pub fn inject_fault(&self, key: &str, fault: Fault) {
        self.lock().faults.insert(key.to_string(), fault);
    }

    pub fn clear_fault(&self, key: &str) {
        self.lock().faults.remove(key);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.method == method).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn handle(
        &self,
        caller: &Principal,
        endpoint: &ServiceEndpoint,
        method: &str,
        args: Value,
    ) -> Result<Value, TransportError> {
        tracing::debug!(caller = %caller, endpoint = %endpoint, method, "Marketplace call");
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            caller: caller.clone(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            args: args.clone(),
        });

        let specific = format!("{}/{}", endpoint, method);
        let fault = state
            .faults
            .get(&specific)
            .or_else(|| state.faults.get(method))
            .cloned();
        match fault {
            Some(Fault::Unreachable) => {
                return Err(TransportError::Unreachable {
                    endpoint: endpoint.clone(),
                    message: "connection refused".to_string(),
                })
            }
            Some(Fault::Timeout) => {
                return Err(TransportError::Timeout {
                    endpoint: endpoint.clone(),
                })
            }
            Some(Fault::Reject(payload)) => return Ok(json!({ "Err": payload })),
            None => {}
        }

        let args = match args {
            Value::Array(items) => items,
            other => vec![other],
        };
        let call = Call {
            caller,
            endpoint,
            method,
            args: &args,
        };
        match endpoint {
            ServiceEndpoint::Profile => state.profile(&call),
            ServiceEndpoint::Factory => state.factory(&self.factory, &call),
            ServiceEndpoint::Ledger => {
                let ledger = &mut state.platform;
                ledger_call(ledger, &call)
            }
            ServiceEndpoint::TokenLedger(token_id) => match state.token_ledgers.get_mut(token_id) {
                Some(ledger) => ledger_call(ledger, &call),
                None => Err(TransportError::Status {
                    endpoint: endpoint.clone(),
                    status: 404,
                    body: format!("no ledger for token {}", token_id),
                }),
            },
        }
    }
}

struct MarketConnection {
    market: FakeMarketplace,
    caller: Principal,
}

#[async_trait]
impl Transport for MarketConnection {
    async fn invoke(
        &self,
        endpoint: &ServiceEndpoint,
        method: &str,
        args: Value,
    ) -> Result<Value, TransportError> {
        self.market.handle(&self.caller, endpoint, method, args)
    }
}

struct Call<'a> {
    caller: &'a Principal,
    endpoint: &'a ServiceEndpoint,
    method: &'a str,
    args: &'a [Value],
}

impl Call<'_> {
    fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, TransportError> {
        let value = self.args.get(index).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| self.bad_request(format!("argument {}: {}", index, e)))
    }

    fn bad_request(&self, message: String) -> TransportError {
        TransportError::Status {
            endpoint: self.endpoint.clone(),
            status: 400,
            body: format!("{}: {}", self.method, message),
        }
    }

    fn unknown_method(&self) -> TransportError {
        TransportError::Status {
            endpoint: self.endpoint.clone(),
            status: 404,
            body: format!("unknown method {}", self.method),
        }
    }
}

fn ok(value: impl Serialize) -> Value {
    json!({ "Ok": value })
}

fn err(value: impl Serialize) -> Value {
    json!({ "Err": value })
}

fn now_nanos() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0)
}

#[derive(Deserialize)]
struct AllowanceArgs {
    account: Account,
    spender: Account,
}

fn ledger_call(ledger: &mut FakeLedger, call: &Call<'_>) -> Result<Value, TransportError> {
    let now = now_nanos();
    match call.method {
        "icrc2_approve" => {
            let args: ApproveArgs = call.arg(0)?;
            Ok(
                match ledger.approve(call.caller, &args.spender.owner, args.amount.0, args.expires_at, now) {
                    Ok(block) => ok(Nat(block)),
                    Err(reject) => err(reject.to_value()),
                },
            )
        }
        "icrc1_transfer" => {
            let args: TransferArgs = call.arg(0)?;
            Ok(match ledger.transfer(call.caller, &args.to.owner, args.amount.0) {
                Ok(block) => ok(Nat(block)),
                Err(reject) => err(reject.to_value()),
            })
        }
        "icrc1_balance_of" => {
            let account: Account = call.arg(0)?;
            Ok(json!(Nat(ledger.balance(&account.owner))))
        }
        "icrc2_allowance" => {
            let args: AllowanceArgs = call.arg(0)?;
            let allowance = ledger.allowance(&args.account.owner, &args.spender.owner, now);
            Ok(json!({ "allowance": Nat(allowance), "expires_at": [] }))
        }
        _ => Err(call.unknown_method()),
    }
}

impl MarketState {
    fn is_admin(&self, caller: &Principal) -> bool {
        self.admin.as_ref() == Some(caller)
    }

    fn profile(&mut self, call: &Call<'_>) -> Result<Value, TransportError> {
        let caller = call.caller.clone();
        match call.method {
            "whoami" => Ok(json!(caller)),
            "get_user" => Ok(match self.profiles.get(&caller) {
                Some(profile) => ok(profile),
                None => err("User not found"),
            }),
            "get_user_by_id" => {
                let id: Principal = call.arg(0)?;
                Ok(match self.profiles.get(&id) {
                    Some(profile) => ok(profile),
                    None => err("User not found"),
                })
            }
            "get_user_list" => Ok(ok(self.profiles.values().collect::<Vec<_>>())),
            "create_user" => {
                let mut profile: Profile = call.arg(0)?;
                if self.profiles.contains_key(&caller) {
                    return Ok(err("User already exists"));
                }
                profile.id = caller.clone();
                self.profiles.insert(caller, profile);
                Ok(ok("User created successfully"))
            }
            "update_user" => {
                let mut profile: Profile = call.arg(0)?;
                if !self.profiles.contains_key(&caller) {
                    return Ok(err("User not found"));
                }
                profile.id = caller.clone();
                self.profiles.insert(caller, profile);
                Ok(ok("User updated successfully"))
            }
            _ => Err(call.unknown_method()),
        }
    }

    fn factory(&mut self, factory: &Principal, call: &Call<'_>) -> Result<Value, TransportError> {
        let caller = call.caller.clone();
        let now = now_nanos();
        match call.method {
            // Admin management
            "get_admin" => Ok(ok(self.admin.clone().unwrap_or_else(Principal::management))),
            "register_admin" => {
                if self.admin.is_some() {
                    return Ok(err("Admin already registered"));
                }
                self.admin = Some(caller);
                Ok(ok("Admin registered successfully"))
            }
            "change_admin" => {
                let new_admin: Principal = call.arg(0)?;
                if !self.is_admin(&caller) {
                    return Ok(err("Not authorized"));
                }
                self.admin = Some(new_admin);
                Ok(ok("Admin changed successfully"))
            }
            "set_token_canister" => {
                let ledger: Principal = call.arg(0)?;
                if !self.is_admin(&caller) {
                    return Ok(err("Not authorized"));
                }
                self.token_canister = Some(ledger);
                Ok(ok("Token canister set"))
            }
            "update_wasm_module" => {
                let encoded: String = call.arg(0)?;
                if !self.is_admin(&caller) {
                    return Ok(err("Not authorized"));
                }
                let module = STANDARD
                    .decode(encoded)
                    .map_err(|e| call.bad_request(e.to_string()))?;
                self.module = module;
                Ok(ok("Wasm module updated"))
            }

            // Faucet requests
            "send_token_faucet_request" => {
                let Nat(amount) = call.arg(0)?;
                if caller.is_anonymous() {
                    return Ok(err("Anonymous principals are not allowed to request tokens"));
                }
                let record = self.faucet.entry(caller).or_insert(FaucetTokenRequest {
                    current_token_request: 0,
                    total_number_of_request: 0,
                    total_token_given: 0,
                    status: None,
                });
                record.current_token_request = amount;
                record.total_number_of_request += 1;
                record.status = Some(RequestStatus::Pending);
                Ok(ok("Token request sent"))
            }
            "get_faucet_requests" => {
                if !self.is_admin(&caller) {
                    return Ok(err("Not authorized"));
                }
                let entries: Vec<(Principal, FaucetTokenRequest)> =
                    self.faucet.iter().map(|(p, r)| (p.clone(), r.clone())).collect();
                Ok(ok(entries))
            }
            "get_caller_faucet_request" => {
                let record: Vec<FaucetTokenRequest> = self.faucet.get(&caller).cloned().into_iter().collect();
                Ok(ok(record))
            }
            "accept_token_request" => {
                let requester: Principal = call.arg(0)?;
                if !self.is_admin(&caller) {
                    return Ok(err("Not authorized"));
                }
                let Some(record) = self.faucet.get(&requester).cloned() else {
                    return Ok(err("Request not found"));
                };
                if record.status.is_some_and(|s| s != RequestStatus::Pending) {
                    return Ok(err("Request already processed"));
                }
                let amount = record.current_token_request;
                if let Err(reject) = self.platform.transfer_from(factory, &caller, &requester, amount, now) {
                    return Ok(err(format!("Transfer failed: {}", reject.describe())));
                }
                if let Some(record) = self.faucet.get_mut(&requester) {
                    record.total_token_given += amount;
                    record.status = Some(RequestStatus::Approved);
                }
                Ok(ok("Request accepted"))
            }
            "reject_token_request" => {
                let requester: Principal = call.arg(0)?;
                if !self.is_admin(&caller) {
                    return Ok(err("Not authorized"));
                }
                match self.faucet.get_mut(&requester) {
                    Some(record) if record.status.is_some_and(|s| s != RequestStatus::Pending) => {
                        Ok(err("Request already processed"))
                    }
                    Some(record) => {
                        record.status = Some(RequestStatus::Rejected);
                        Ok(ok("Request rejected"))
                    }
                    None => Ok(err("Request not found")),
                }
            }

            // Tokens
            "create_talent_token_canister" => {
                let spec: TokenSpec = call.arg(0)?;
                if self.owners.contains_key(&caller) {
                    return Ok(err("You can only create one token"));
                }
                if let Err(reject) =
                    self.platform
                        .transfer_from(factory, &caller, factory, CREATION_FEE, now)
                {
                    return Ok(err(json!({ "TransferFailed": reject.describe() })));
                }

                self.next_token += 1;
                let token_id = test_principal(0x8000 + self.next_token);
                let mut ledger = FakeLedger::default();
                ledger.mint(factory, u128::from(spec.total_supply));
                self.token_ledgers.insert(token_id.clone(), ledger);
                self.tokens.insert(
                    token_id.clone(),
                    TokenMetadata {
                        name: spec.name,
                        symbol: spec.symbol,
                        decimals: spec.decimals,
                        total_supply: spec.total_supply,
                        owner: caller.clone(),
                        logo: spec.logo,
                        created: now,
                        unit_price: spec.unit_price,
                    },
                );
                self.owners.insert(caller, token_id.clone());
                Ok(ok(token_id))
            }
            "get_list_of_tokens" => {
                let entries: Vec<(TokenId, TokenMetadata)> =
                    self.tokens.iter().map(|(id, m)| (id.clone(), m.clone())).collect();
                Ok(ok(entries))
            }
            "get_token_metadata" => {
                let token_id: TokenId = call.arg(0)?;
                Ok(match self.tokens.get(&token_id) {
                    Some(metadata) => ok(metadata),
                    None => err("Token not found"),
                })
            }
            "get_user_token_metadata" => {
                let owned = self
                    .owners
                    .get(&caller)
                    .and_then(|id| self.tokens.get(id).map(|metadata| (id, metadata)));
                Ok(match owned {
                    Some(entry) => ok(entry),
                    None => err("Token not found for this user"),
                })
            }
            "buy_talent_token" => {
                let token_id: TokenId = call.arg(0)?;
                let Nat(quantity) = call.arg(1)?;
                let Some(metadata) = self.tokens.get(&token_id).cloned() else {
                    return Ok(err("Token not found"));
                };
                let Some(cost) = quantity.checked_mul(u128::from(metadata.unit_price)) else {
                    return Ok(err("Purchase amount overflows"));
                };
                let available = self
                    .token_ledgers
                    .get(&token_id)
                    .map(|l| l.balance(factory))
                    .unwrap_or(0);
                if available < quantity {
                    return Ok(err("Not enough tokens available"));
                }
                if let Err(reject) =
                    self.platform
                        .transfer_from(factory, &caller, &metadata.owner, cost, now)
                {
                    return Ok(err(format!("Transfer failed: {}", reject.describe())));
                }
                if let Some(ledger) = self.token_ledgers.get_mut(&token_id) {
                    if let Err(reject) = ledger.transfer(factory, &caller, quantity) {
                        return Ok(err(format!("Token transfer failed: {}", reject.describe())));
                    }
                }
                *self
                    .holdings
                    .entry(caller)
                    .or_default()
                    .entry(token_id)
                    .or_default() += quantity;
                Ok(ok("Tokens purchased successfully"))
            }
            "get_all_balances_for_caller" => {
                let entries: Vec<(TokenId, Nat)> = self
                    .holdings
                    .get(&caller)
                    .map(|h| h.iter().map(|(id, n)| (id.clone(), Nat(*n))).collect())
                    .unwrap_or_default();
                Ok(ok(entries))
            }
            _ => Err(call.unknown_method()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principals_are_well_formed_and_distinct() {
        let a = test_principal(1);
        let b = test_principal(2);
        assert_ne!(a, b);
        assert!(Principal::parse(a.as_str()).is_ok());
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let owner = test_principal(1);
        let spender = test_principal(2);
        let mut ledger = FakeLedger::default();
        ledger.mint(&owner, 500);
        ledger.approve(&owner, &spender, 200, None, 0).unwrap();

        ledger.transfer_from(&spender, &owner, &spender, 150, 0).unwrap();
        assert_eq!(ledger.allowance(&owner, &spender, 0), 50);
        assert!(matches!(
            ledger.transfer_from(&spender, &owner, &spender, 60, 0),
            Err(LedgerReject::InsufficientAllowance { allowance: 50 })
        ));
        assert_eq!(ledger.balance(&owner), 350);
    }

    #[test]
    fn test_expired_allowance_reads_as_zero() {
        let owner = test_principal(1);
        let spender = test_principal(2);
        let mut ledger = FakeLedger::default();
        ledger.approve(&owner, &spender, 10, Some(100), 50).unwrap();
        assert_eq!(ledger.allowance(&owner, &spender, 99), 10);
        assert_eq!(ledger.allowance(&owner, &spender, 100), 0);
    }
}
