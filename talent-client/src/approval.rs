//! Two-phase "approve spending, then execute" protocol.
//!
//! Every token-consuming action (token creation, token purchase, faucet
//! disbursement) first grants an allowance on the platform ledger to the
//! principal that will debit it, and only then invokes the action. The two
//! calls are never batched: the action is attempted if and only if the
//! approval was accepted.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{Duration, Utc};
use talent_core::ServiceError;
use talent_core::config::ApprovalSettings;
use talent_core::error::ValidationError;
use talent_core::gateway::ApproveArgs;
use talent_core::models::Principal;

use crate::session::Session;

/// Parse a user-supplied amount. Zero, negative and non-numeric input are rejected.
pub fn parse_amount(text: &str) -> Result<u128, ValidationError> {
    let trimmed = text.trim();
    if trimmed.starts_with('-') {
        return Err(ValidationError::NonPositiveAmount);
    }
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidAmount(text.to_string()));
    }
    match trimmed.parse::<u128>() {
        Ok(0) => Err(ValidationError::NonPositiveAmount),
        Ok(amount) => Ok(amount),
        Err(_) => Err(ValidationError::AmountOverflow),
    }
}

/// Amount and spender of one approval. The spender is fixed here and reused
/// unchanged for the follow-up action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendPlan {
    amount: u128,
    beneficiary: Principal,
}

impl SpendPlan {
    pub fn new(amount: u128, beneficiary: Principal) -> Result<Self, ValidationError> {
        if amount == 0 {
            return Err(ValidationError::NonPositiveAmount);
        }
        Ok(Self {
            amount,
            beneficiary,
        })
    }

    pub fn parse(amount: &str, beneficiary: &str) -> Result<Self, ValidationError> {
        Self::new(parse_amount(amount)?, Principal::parse(beneficiary)?)
    }

    pub fn amount(&self) -> u128 {
        self.amount
    }

    pub fn beneficiary(&self) -> &Principal {
        &self.beneficiary
    }
}

/// Step of the protocol that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendPhase {
    Approve,
    Execute,
}

impl fmt::Display for SpendPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpendPhase::Approve => f.write_str("approve"),
            SpendPhase::Execute => f.write_str("execute"),
        }
    }
}

#[derive(Debug)]
pub struct SpendFailure {
    pub phase: SpendPhase,
    pub error: ServiceError,
}

/// What happened to an unused allowance after the action failed.
#[derive(Debug, Default)]
pub enum Revocation {
    #[default]
    NotAttempted,
    Revoked,
    Failed(ServiceError),
}

/// Combined result of one approve-then-execute run.
#[derive(Debug)]
pub struct SpendOutcome<T> {
    pub approved: bool,
    pub executed: bool,
    /// An allowance was granted but not consumed; a later approval replaces it.
    pub allowance_outstanding: bool,
    pub approval_block: Option<u128>,
    pub value: Option<T>,
    pub error: Option<SpendFailure>,
    pub revocation: Revocation,
}

impl<T> SpendOutcome<T> {
    fn approve_failed(error: ServiceError) -> Self {
        Self {
            approved: false,
            executed: false,
            allowance_outstanding: false,
            approval_block: None,
            value: None,
            error: Some(SpendFailure {
                phase: SpendPhase::Approve,
                error,
            }),
            revocation: Revocation::NotAttempted,
        }
    }

    pub fn is_success(&self) -> bool {
        self.approved && self.executed && self.error.is_none()
    }

    pub fn failed_phase(&self) -> Option<SpendPhase> {
        self.error.as_ref().map(|f| f.phase)
    }

    pub fn reject_reason(&self) -> Option<&talent_core::error::RejectReason> {
        self.error.as_ref().and_then(|f| f.error.reject_reason())
    }

    /// Collapse into a plain result, dropping the phase bookkeeping.
    pub fn into_result(self) -> Result<T, ServiceError> {
        match (self.error, self.value) {
            (Some(failure), _) => Err(failure.error),
            (None, Some(value)) => Ok(value),
            (None, None) => Err(ServiceError::rejected(
                "spend_then_execute",
                talent_core::error::RejectReason::Other("action produced no value".to_string()),
            )),
        }
    }
}

/// Runs the approve-then-execute protocol against the session's platform ledger.
#[derive(Clone)]
pub struct ApprovalCoordinator {
    session: Arc<Session>,
    settings: ApprovalSettings,
}

impl ApprovalCoordinator {
    /// Create a new coordinator for the given session.
    pub fn new(session: Arc<Session>, settings: ApprovalSettings) -> Self {
        Self { session, settings }
    }

    fn expires_at(&self) -> Option<u64> {
        let secs = self.settings.expiry_secs?;
        let at = Utc::now().checked_add_signed(Duration::seconds(i64::try_from(secs).ok()?))?;
        at.timestamp_nanos_opt().and_then(|n| u64::try_from(n).ok())
    }

    /// Approve `plan.amount` for `plan.beneficiary`, then run `action` once.
    ///
    /// `action` receives the same beneficiary the allowance was granted to.
    pub async fn spend_then_execute<T, F, Fut>(&self, plan: &SpendPlan, action: F) -> SpendOutcome<T>
    where
        F: FnOnce(Principal) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        if let Err(violation) = self.session.ensure_current() {
            return SpendOutcome::approve_failed(violation.into());
        }

        let args = ApproveArgs::new(plan.beneficiary.clone(), plan.amount, self.expires_at());
        let block = match self.session.ledger().approve_allowance(&args).await {
            Ok(block) => block,
            Err(error) => {
                tracing::warn!(
                    amount = %plan.amount,
                    spender = %plan.beneficiary,
                    error = %error,
                    "Spend approval failed; action not attempted"
                );
                return SpendOutcome::approve_failed(error);
            }
        };
        tracing::info!(amount = %plan.amount, spender = %plan.beneficiary, block = %block, "Spend approved");

        let mut outcome = SpendOutcome {
            approved: true,
            executed: false,
            allowance_outstanding: true,
            approval_block: Some(block),
            value: None,
            error: None,
            revocation: Revocation::NotAttempted,
        };

        if let Err(violation) = self.session.ensure_current() {
            outcome.error = Some(SpendFailure {
                phase: SpendPhase::Execute,
                error: violation.into(),
            });
            return outcome;
        }

        match action(plan.beneficiary.clone()).await {
            Ok(value) => {
                outcome.executed = true;
                outcome.allowance_outstanding = false;
                match self.session.confirm(value) {
                    Ok(value) => {
                        tracing::info!(amount = %plan.amount, spender = %plan.beneficiary, "Spend executed");
                        outcome.value = Some(value);
                    }
                    Err(violation) => {
                        tracing::warn!("Session ended during spend; result discarded");
                        outcome.error = Some(SpendFailure {
                            phase: SpendPhase::Execute,
                            error: violation.into(),
                        });
                    }
                }
            }
            Err(error) => {
                tracing::warn!(
                    amount = %plan.amount,
                    spender = %plan.beneficiary,
                    error = %error,
                    "Action failed after approval; allowance may be outstanding"
                );
                outcome.error = Some(SpendFailure {
                    phase: SpendPhase::Execute,
                    error,
                });
                if self.settings.revoke_on_failure {
                    outcome.revocation = self.revoke(plan).await;
                    if matches!(outcome.revocation, Revocation::Revoked) {
                        outcome.allowance_outstanding = false;
                    }
                }
            }
        }

        outcome
    }

    /// Allowance the session identity currently grants `spender` on the platform ledger.
    pub async fn outstanding_allowance(&self, spender: &Principal) -> Result<u128, ServiceError> {
        self.session.ensure_current()?;
        let allowance = self
            .session
            .ledger()
            .allowance(self.session.identity(), spender)
            .await?;
        Ok(self.session.confirm(allowance)?)
    }

    async fn revoke(&self, plan: &SpendPlan) -> Revocation {
        let args = ApproveArgs::new(plan.beneficiary.clone(), 0, None);
        match self.session.ledger().approve_allowance(&args).await {
            Ok(_) => {
                tracing::info!(spender = %plan.beneficiary, "Unused allowance revoked");
                Revocation::Revoked
            }
            Err(error) => {
                tracing::warn!(spender = %plan.beneficiary, error = %error, "Allowance revocation failed");
                Revocation::Failed(error)
            }
        }
    }
}
