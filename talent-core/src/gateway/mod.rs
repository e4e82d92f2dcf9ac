//! Typed access to the three marketplace services.
//!
//! This module provides:
//! - `ServiceGateway`: a single `call` entry point that marshals positional
//!   arguments, forwards them over a `Transport` and unwraps the reply envelope
//! - `ProfileService`, `FactoryService`, `LedgerService`: typed proxies over the gateway
//! - `HttpTransport`: the production transport (JSON over HTTP with trace propagation)
//!
//! The gateway never retries. Retry policy belongs to the orchestration caller.

pub mod envelope;
pub mod factory;
pub mod http;
pub mod ledger;
pub mod profile;
pub mod wire;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ServiceError, TransportError};
use crate::models::TokenId;

pub use factory::{FactoryService, FaucetTokenRequest};
pub use http::{HttpTransport, HttpTransportConfig};
pub use ledger::{ApproveArgs, LedgerService, TransferArgs};
pub use profile::ProfileService;
pub use wire::Account;

/// A network-addressable service the client talks to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceEndpoint {
    Profile,
    Factory,
    /// The platform currency ledger.
    Ledger,
    /// The ledger of an individual talent token.
    TokenLedger(TokenId),
}

impl ServiceEndpoint {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceEndpoint::Profile => "profile-service",
            ServiceEndpoint::Factory => "factory-service",
            ServiceEndpoint::Ledger => "ledger-service",
            ServiceEndpoint::TokenLedger(_) => "token-ledger",
        }
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceEndpoint::TokenLedger(id) => write!(f, "token-ledger/{}", id),
            other => f.write_str(other.name()),
        }
    }
}

/// Moves one encoded call to a service and returns its raw JSON reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn invoke(
        &self,
        endpoint: &ServiceEndpoint,
        method: &str,
        args: Value,
    ) -> Result<Value, TransportError>;
}

/// Entry point shared by the typed service proxies.
#[derive(Clone)]
pub struct ServiceGateway {
    transport: Arc<dyn Transport>,
}

impl ServiceGateway {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn profile(&self) -> ProfileService {
        ProfileService::new(self.clone())
    }

    pub fn factory(&self) -> FactoryService {
        FactoryService::new(self.clone())
    }

    pub fn ledger(&self) -> LedgerService {
        LedgerService::new(self.clone(), ServiceEndpoint::Ledger)
    }

    pub fn token_ledger(&self, token_id: TokenId) -> LedgerService {
        LedgerService::new(self.clone(), ServiceEndpoint::TokenLedger(token_id))
    }

    /// Invoke a fallible remote operation and unwrap its result envelope.
    pub async fn call(
        &self,
        endpoint: &ServiceEndpoint,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, ServiceError> {
        let reply = self.send(endpoint, method, args).await?;
        let outcome = envelope::open(method, reply);
        if let Err(err) = &outcome {
            tracing::warn!(endpoint = %endpoint, operation = method, error = %err, "Remote call rejected");
        }
        outcome
    }

    /// Invoke an operation whose reply is a bare value rather than an envelope.
    pub async fn query(
        &self,
        endpoint: &ServiceEndpoint,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, ServiceError> {
        Ok(self.send(endpoint, method, args).await?)
    }

    pub async fn call_as<T: DeserializeOwned>(
        &self,
        endpoint: &ServiceEndpoint,
        method: &str,
        args: Vec<Value>,
    ) -> Result<T, ServiceError> {
        let value = self.call(endpoint, method, args).await?;
        Ok(wire::decode(method, value)?)
    }

    pub async fn query_as<T: DeserializeOwned>(
        &self,
        endpoint: &ServiceEndpoint,
        method: &str,
        args: Vec<Value>,
    ) -> Result<T, ServiceError> {
        let value = self.query(endpoint, method, args).await?;
        Ok(wire::decode(method, value)?)
    }

    async fn send(
        &self,
        endpoint: &ServiceEndpoint,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, TransportError> {
        tracing::debug!(endpoint = %endpoint, operation = method, "Calling remote service");
        self.transport
            .invoke(endpoint, method, Value::Array(args))
            .await
            .inspect_err(|err| {
                tracing::error!(endpoint = %endpoint, operation = method, error = %err, "Remote call failed in transport");
            })
    }
}
