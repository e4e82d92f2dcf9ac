//! Process-wide session state.
//!
//! A `SessionContext` starts empty, is populated by `sign_in` and cleared by
//! `sign_out`. Components never own the lifecycle; they hold an
//! `Arc<Session>` snapshot and ask it whether it is still current before
//! applying any result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use talent_core::ServiceError;
use talent_core::error::InvariantViolation;
use talent_core::gateway::{
    FactoryService, LedgerService, ProfileService, ServiceGateway, Transport,
};
use talent_core::models::{Principal, TokenId};

#[derive(Default)]
struct ContextState {
    current: RwLock<Option<Arc<Session>>>,
    epoch: AtomicU64,
}

/// One signed-in identity with its service proxies.
pub struct Session {
    identity: Principal,
    gateway: ServiceGateway,
    profile: ProfileService,
    factory: FactoryService,
    ledger: LedgerService,
    factory_principal: Principal,
    epoch: u64,
    context: Weak<ContextState>,
}

impl Session {
    pub fn identity(&self) -> &Principal {
        &self.identity
    }

    /// Principal of the factory service; spender of every allowance it debits.
    pub fn factory_principal(&self) -> &Principal {
        &self.factory_principal
    }

    pub fn profile(&self) -> &ProfileService {
        &self.profile
    }

    pub fn factory(&self) -> &FactoryService {
        &self.factory
    }

    /// The platform currency ledger.
    pub fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    pub fn token_ledger(&self, token_id: TokenId) -> LedgerService {
        self.gateway.token_ledger(token_id)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// False once the context signed out or another identity signed in.
    pub fn is_current(&self) -> bool {
        self.context
            .upgrade()
            .is_some_and(|state| state.epoch.load(Ordering::Acquire) == self.epoch)
    }

    pub fn ensure_current(&self) -> Result<(), InvariantViolation> {
        if self.is_current() {
            Ok(())
        } else {
            Err(InvariantViolation::StaleSession)
        }
    }

    /// Pass `value` through only if the session is still current.
    pub fn confirm<T>(&self, value: T) -> Result<T, InvariantViolation> {
        self.ensure_current().map(|_| value)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("factory_principal", &self.factory_principal)
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// Holder of the current session. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct SessionContext {
    state: Arc<ContextState>,
}

impl SessionContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `identity` as the current caller. Any previous session becomes stale.
    pub fn sign_in(
        &self,
        identity: Principal,
        transport: Arc<dyn Transport>,
        factory_principal: Principal,
    ) -> Arc<Session> {
        let gateway = ServiceGateway::new(transport);
        let mut current = self
            .state
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let epoch = self.state.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let session = Arc::new(Session {
            identity,
            profile: gateway.profile(),
            factory: gateway.factory(),
            ledger: gateway.ledger(),
            gateway,
            factory_principal,
            epoch,
            context: Arc::downgrade(&self.state),
        });
        *current = Some(session.clone());

        tracing::info!(identity = %session.identity, epoch, "Session started");
        session
    }

    /// Ask the profile service who the transport authenticates as, then sign in as that identity.
    pub async fn sign_in_with_whoami(
        &self,
        transport: Arc<dyn Transport>,
        factory_principal: Principal,
    ) -> Result<Arc<Session>, ServiceError> {
        let identity = ServiceGateway::new(transport.clone())
            .profile()
            .whoami()
            .await?;
        if identity.is_anonymous() {
            tracing::warn!("Signing in with the anonymous identity");
        }
        Ok(self.sign_in(identity, transport, factory_principal))
    }

    /// Clear the session. Results of operations started before this point are discarded.
    pub fn sign_out(&self) {
        let mut current = self
            .state
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.state.epoch.fetch_add(1, Ordering::AcqRel);
        if let Some(session) = current.take() {
            tracing::info!(identity = %session.identity, epoch = session.epoch, "Session ended");
        }
    }

    pub fn current(&self) -> Result<Arc<Session>, InvariantViolation> {
        self.state
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(InvariantViolation::NoActiveSession)
    }

    pub fn is_signed_in(&self) -> bool {
        self.current().is_ok()
    }
}
