//! talent-client: Orchestration layer of the talent marketplace.
//!
//! Components, leaf-first:
//! - `SessionContext`: holder of the signed-in identity and its service proxies
//! - `ApprovalCoordinator`: the approve-then-execute protocol
//! - `RequestLedger`: reconciled mirror of the faucet request queue
//! - `AdminGovernance`: authorization-gated factory administration
//! - `BalanceAggregator`: per-token balances merged into one report
//! - `ProfileDesk`, `TokenDesk`: profile and token operations
//!
//! `TalentClient` wires them to a `Config` and hands out per-session handles.

pub mod approval;
pub mod balances;
pub mod governance;
pub mod profiles;
pub mod requests;
pub mod session;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use secrecy::Secret;
use talent_core::ServiceError;
use talent_core::config::Config;
use talent_core::error::{InvariantViolation, SetupError};
use talent_core::gateway::{HttpTransport, HttpTransportConfig, Transport};
use talent_core::models::Principal;
use talent_core::observability::init_tracing;

pub use approval::{
    ApprovalCoordinator, Revocation, SpendFailure, SpendOutcome, SpendPhase, SpendPlan,
    parse_amount,
};
pub use balances::{BalanceAggregator, BalanceAttempt, BalanceReport, BalanceWarning};
pub use governance::{AdminClearance, AdminGovernance, AdminTransfer};
pub use profiles::ProfileDesk;
pub use requests::{
    Decision, RequestLedger, RequestScope, TransitionError, TransitionOutcome, TransitionPhase,
};
pub use session::{Session, SessionContext};
pub use tokens::{TOKEN_CREATION_FEE, TokenDesk, TokenListing, purchase_cost};

/// Entry point for a presentation layer: one configuration, one session context.
#[derive(Clone)]
pub struct TalentClient {
    config: Config,
    context: SessionContext,
}

impl TalentClient {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            context: SessionContext::new(),
        }
    }

    /// Load configuration from the environment and install the global
    /// tracing subscriber.
    ///
    /// Must be called from within a Tokio runtime when an OTLP endpoint is configured.
    pub fn from_env() -> Result<Self, SetupError> {
        let config = Config::load()?;
        init_tracing(
            &config.service_name,
            &config.log_level,
            config.otlp_endpoint.as_deref(),
        )?;

        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            factory = %config.factory_principal(),
            otlp_endpoint = ?config.otlp_endpoint,
            "Starting talent client"
        );
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Build the HTTP transport for a delegated credential.
    pub fn http_transport(
        &self,
        credential: Option<Secret<String>>,
    ) -> Result<Arc<dyn Transport>, SetupError> {
        let transport =
            HttpTransport::new(HttpTransportConfig::from_config(&self.config), credential)?;
        Ok(Arc::new(transport))
    }

    /// Sign in as `identity` over `transport`.
    pub fn sign_in(&self, identity: Principal, transport: Arc<dyn Transport>) -> Arc<Session> {
        self.context.sign_in(
            identity,
            transport,
            self.config.factory_principal().clone(),
        )
    }

    /// Sign in as whoever the profile service says `transport` authenticates.
    pub async fn sign_in_with_whoami(
        &self,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Session>, ServiceError> {
        self.context
            .sign_in_with_whoami(transport, self.config.factory_principal().clone())
            .await
    }

    pub fn sign_out(&self) {
        self.context.sign_out();
    }

    pub fn session(&self) -> Result<Arc<Session>, InvariantViolation> {
        self.context.current()
    }

    pub fn coordinator(&self) -> Result<ApprovalCoordinator, InvariantViolation> {
        Ok(ApprovalCoordinator::new(
            self.session()?,
            self.config.approvals.clone(),
        ))
    }

    pub fn requests(&self) -> Result<RequestLedger, InvariantViolation> {
        Ok(RequestLedger::new(
            self.session()?,
            self.config.approvals.clone(),
        ))
    }

    pub fn governance(&self) -> Result<AdminGovernance, InvariantViolation> {
        Ok(AdminGovernance::new(self.session()?))
    }

    pub fn balances(&self) -> Result<BalanceAggregator, InvariantViolation> {
        Ok(BalanceAggregator::new(self.session()?, &self.config.balances))
    }

    pub fn profiles(&self) -> Result<ProfileDesk, InvariantViolation> {
        Ok(ProfileDesk::new(self.session()?))
    }

    pub fn tokens(&self) -> Result<TokenDesk, InvariantViolation> {
        Ok(TokenDesk::new(self.session()?, self.config.approvals.clone()))
    }
}
