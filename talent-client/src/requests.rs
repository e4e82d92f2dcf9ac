//! Client-side mirror of the factory's faucet request queue.
//!
//! The server view is authoritative: `refresh` replaces the whole local view.
//! Local changes made after a successful mutation are tentative overlays that
//! the next refresh either confirms or silently discards.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use talent_core::ServiceError;
use talent_core::config::ApprovalSettings;
use talent_core::error::{InvariantViolation, ValidationError};
use talent_core::models::{FaucetRequest, RequestId, RequestStatus};
use thiserror::Error;

use crate::approval::{ApprovalCoordinator, SpendPhase, SpendPlan};
use crate::governance::AdminGovernance;
use crate::session::Session;

/// Which part of the queue the mirror holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestScope {
    /// The session identity's own request.
    Own,
    /// The full queue (admin view).
    All,
}

/// Terminal state an admin moves a pending request to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn status(self) -> RequestStatus {
        match self {
            Decision::Approved => RequestStatus::Approved,
            Decision::Rejected => RequestStatus::Rejected,
        }
    }

    pub fn operation(self) -> &'static str {
        match self {
            Decision::Approved => "accept_token_request",
            Decision::Rejected => "reject_token_request",
        }
    }
}

/// Step of a transition that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPhase {
    /// Local checks; nothing was sent.
    Precheck,
    /// Granting the disbursement allowance to the factory.
    Allowance,
    /// The accept/reject call itself.
    Mutation,
}

impl fmt::Display for TransitionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionPhase::Precheck => f.write_str("precheck"),
            TransitionPhase::Allowance => f.write_str("allowance"),
            TransitionPhase::Mutation => f.write_str("mutation"),
        }
    }
}

#[derive(Debug, Error)]
#[error("request transition failed during {phase}: {source}")]
pub struct TransitionError {
    pub phase: TransitionPhase,
    /// The disbursement allowance was granted but the mutation did not consume it.
    pub allowance_outstanding: bool,
    #[source]
    pub source: ServiceError,
}

impl TransitionError {
    pub(crate) fn precheck(source: impl Into<ServiceError>) -> Self {
        Self {
            phase: TransitionPhase::Precheck,
            allowance_outstanding: false,
            source: source.into(),
        }
    }

    pub fn is_not_pending(&self) -> bool {
        matches!(
            self.source,
            ServiceError::Invariant(InvariantViolation::RequestNotPending { .. })
        )
    }
}

/// Result of a successful transition.
#[derive(Debug)]
pub struct TransitionOutcome {
    pub request_id: RequestId,
    pub decision: Decision,
    pub message: String,
    /// Status after the confirming refresh; `None` if the request is no
    /// longer listed or the refresh failed.
    pub confirmed_status: Option<RequestStatus>,
    /// Set when the confirming refresh failed; the tentative status stays visible.
    pub refresh_error: Option<ServiceError>,
}

/// Reconciled view of faucet requests for one session.
pub struct RequestLedger {
    session: Arc<Session>,
    approvals: ApprovalSettings,
    scope: RequestScope,
    view: Vec<FaucetRequest>,
    tentative: HashSet<RequestId>,
}

impl RequestLedger {
    /// Create an empty mirror; call `refresh` to populate it.
    pub fn new(session: Arc<Session>, approvals: ApprovalSettings) -> Self {
        Self {
            session,
            approvals,
            scope: RequestScope::Own,
            view: Vec::new(),
            tentative: HashSet::new(),
        }
    }

    pub fn view(&self) -> &[FaucetRequest] {
        &self.view
    }

    pub fn scope(&self) -> RequestScope {
        self.scope
    }

    pub fn get(&self, request_id: &RequestId) -> Option<&FaucetRequest> {
        self.view.iter().find(|r| r.id() == request_id)
    }

    /// Whether the entry reflects a local change not yet confirmed by a refresh.
    pub fn is_tentative(&self, request_id: &RequestId) -> bool {
        self.tentative.contains(request_id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &FaucetRequest> {
        self.view.iter().filter(|r| r.is_pending())
    }

    /// Replace the local view with the service's. Ordered by requester.
    pub async fn refresh(&mut self, scope: RequestScope) -> Result<&[FaucetRequest], ServiceError> {
        self.session.ensure_current()?;
        let factory = self.session.factory();

        let fetched: Vec<FaucetRequest> = match scope {
            RequestScope::Own => factory
                .caller_faucet_request(self.session.identity())
                .await?
                .into_iter()
                .collect(),
            RequestScope::All => factory.list_faucet_requests().await?,
        };
        let mut fetched = self.session.confirm(fetched)?;
        fetched.sort_by(|a, b| a.requester.cmp(&b.requester));

        let discarded = self
            .tentative
            .iter()
            .filter(|id| {
                let local = self.get(id).map(|r| r.status);
                let remote = fetched.iter().find(|r| r.id() == *id).map(|r| r.status);
                local != remote
            })
            .count();
        if discarded > 0 {
            tracing::debug!(discarded, "Refresh overrode tentative request states");
        }

        self.scope = scope;
        self.view = fetched;
        self.tentative.clear();
        tracing::debug!(scope = ?scope, requests = self.view.len(), "Request view refreshed");
        Ok(&self.view)
    }

    /// Move a pending request to a terminal state.
    ///
    /// The factory admin is looked up through `governance` after the local
    /// checks and immediately before anything is sent, so a role that moved
    /// since an earlier call is caught here. Approval first grants the
    /// requested amount to the factory, which disburses it from the admin's
    /// balance. On success the new state is applied tentatively and confirmed
    /// by a refresh of the current scope.
    pub async fn transition(
        &mut self,
        governance: &AdminGovernance,
        request_id: &RequestId,
        decision: Decision,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.session
            .ensure_current()
            .map_err(TransitionError::precheck)?;

        let request = self
            .get(request_id)
            .cloned()
            .ok_or_else(|| {
                TransitionError::precheck(InvariantViolation::UnknownRequest {
                    request_id: request_id.clone(),
                })
            })?;
        if request.status.is_terminal() {
            tracing::warn!(request = %request_id, status = %request.status, "Request already decided");
            return Err(TransitionError::precheck(
                InvariantViolation::RequestNotPending {
                    request_id: request_id.clone(),
                    status: request.status,
                },
            ));
        }

        let clearance = governance
            .authorize(decision.operation())
            .await
            .map_err(TransitionError::precheck)?;
        if !clearance.covers(&self.session) {
            return Err(TransitionError::precheck(ServiceError::not_authorized(
                decision.operation(),
            )));
        }

        let message = match decision {
            Decision::Approved => self.approve(&request).await?,
            Decision::Rejected => self
                .session
                .factory()
                .reject_faucet_request(request_id)
                .await
                .map_err(|source| TransitionError {
                    phase: TransitionPhase::Mutation,
                    allowance_outstanding: false,
                    source,
                })?,
        };
        tracing::info!(request = %request_id, status = %decision.status(), "Request transitioned");

        if let Some(entry) = self.view.iter_mut().find(|r| r.id() == request_id) {
            entry.status = decision.status();
            if decision == Decision::Approved {
                entry.total_amount_granted =
                    entry.total_amount_granted.saturating_add(entry.current_amount_requested);
            }
            self.tentative.insert(request_id.clone());
        }

        let scope = self.scope;
        let refreshed = self.refresh(scope).await.map(|_| ());
        let (confirmed_status, refresh_error) = match refreshed {
            Ok(()) => (self.get(request_id).map(|r| r.status), None),
            Err(err) => {
                tracing::warn!(request = %request_id, error = %err, "Confirming refresh failed");
                (None, Some(err))
            }
        };

        Ok(TransitionOutcome {
            request_id: request_id.clone(),
            decision,
            message,
            confirmed_status,
            refresh_error,
        })
    }

    async fn approve(&self, request: &FaucetRequest) -> Result<String, TransitionError> {
        let plan = SpendPlan::new(
            request.current_amount_requested,
            self.session.factory_principal().clone(),
        )
        .map_err(|e: ValidationError| TransitionError::precheck(e))?;

        let factory = self.session.factory().clone();
        let requester = request.requester.clone();
        let outcome = ApprovalCoordinator::new(self.session.clone(), self.approvals.clone())
            .spend_then_execute(&plan, |_| async move {
                factory.approve_faucet_request(&requester).await
            })
            .await;

        let allowance_outstanding = outcome.allowance_outstanding;
        let phase = match outcome.failed_phase() {
            Some(SpendPhase::Approve) => TransitionPhase::Allowance,
            _ => TransitionPhase::Mutation,
        };
        outcome.into_result().map_err(|source| TransitionError {
            phase,
            allowance_outstanding,
            source,
        })
    }

    /// Ask for `amount` from the faucet. The own entry becomes a tentative
    /// Pending request until the next refresh.
    pub async fn submit_faucet_request(&mut self, amount: u128) -> Result<String, ServiceError> {
        if amount == 0 {
            return Err(ValidationError::NonPositiveAmount.into());
        }
        self.session.ensure_current()?;

        let message = self.session.factory().submit_faucet_request(amount).await?;
        let message = self.session.confirm(message)?;
        tracing::info!(amount = %amount, "Faucet request submitted");

        let identity = self.session.identity().clone();
        match self.view.iter_mut().find(|r| r.requester == identity) {
            Some(entry) => {
                entry.current_amount_requested = amount;
                entry.total_requests_count = entry.total_requests_count.saturating_add(1);
                entry.status = RequestStatus::Pending;
            }
            None => {
                self.view.push(FaucetRequest {
                    requester: identity.clone(),
                    current_amount_requested: amount,
                    total_requests_count: 1,
                    total_amount_granted: 0,
                    status: RequestStatus::Pending,
                });
                self.view.sort_by(|a, b| a.requester.cmp(&b.requester));
            }
        }
        self.tentative.insert(identity);
        Ok(message)
    }
}
