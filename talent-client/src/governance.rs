//! Role-gated factory administration.
//!
//! Authorization is looked up from the factory before every privileged call
//! and never cached: the admin role can move between two calls. A local
//! denial fails with `NotAuthorized` without issuing the mutating call.

use std::sync::Arc;

use talent_core::ServiceError;
use talent_core::error::{RejectReason, ValidationError};
use talent_core::models::{Principal, RequestId};

use crate::requests::{Decision, RequestLedger, TransitionError, TransitionOutcome};
use crate::session::Session;

/// Proof that the session's identity was the factory admin when it was issued.
///
/// Only `AdminGovernance::authorize` creates one. It records a single lookup
/// and grants nothing on later calls; every privileged call authorizes again.
#[derive(Debug, Clone)]
pub struct AdminClearance {
    admin: Principal,
    epoch: u64,
}

impl AdminClearance {
    pub fn admin(&self) -> &Principal {
        &self.admin
    }

    /// Whether this clearance was issued for `session`.
    pub fn covers(&self, session: &Session) -> bool {
        self.epoch == session.epoch() && &self.admin == session.identity()
    }
}

/// Result of handing the admin role to another identity.
#[derive(Debug)]
pub struct AdminTransfer {
    pub message: String,
    pub new_admin: Principal,
    /// Re-checked after the transfer; false on every successful hand-over.
    pub caller_still_admin: bool,
}

/// Privileged factory operations for the current session.
#[derive(Clone)]
pub struct AdminGovernance {
    session: Arc<Session>,
}

impl AdminGovernance {
    /// Create a new governance handle for the given session.
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// The registered admin, or `None` when the factory has none yet.
    pub async fn current_admin(&self) -> Result<Option<Principal>, ServiceError> {
        self.session.ensure_current()?;
        let admin = self.session.factory().get_admin().await?;
        let unset = admin.as_str() == Principal::MANAGEMENT
            || admin.is_anonymous()
            || &admin == self.session.factory_principal();
        Ok(self.session.confirm((!unset).then_some(admin))?)
    }

    /// Whether the session identity is the factory admin right now.
    pub async fn check_authorization(&self) -> Result<bool, ServiceError> {
        let admin = self.current_admin().await?;
        let authorized = admin.as_ref() == Some(self.session.identity());
        tracing::debug!(identity = %self.session.identity(), authorized, "Checked admin authorization");
        Ok(authorized)
    }

    /// Check authorization and issue a clearance, or fail with `NotAuthorized`.
    pub async fn authorize(&self, operation: &str) -> Result<AdminClearance, ServiceError> {
        if !self.check_authorization().await? {
            tracing::warn!(identity = %self.session.identity(), operation, "Privileged operation denied locally");
            return Err(ServiceError::not_authorized(operation));
        }
        Ok(AdminClearance {
            admin: self.session.identity().clone(),
            epoch: self.session.epoch(),
        })
    }

    // =========================================================================
    // Admin Role
    // =========================================================================

    /// Claim the admin role. Only possible while no admin is registered.
    pub async fn register_as_admin(&self) -> Result<String, ServiceError> {
        if let Some(admin) = self.current_admin().await? {
            tracing::warn!(admin = %admin, "Admin already registered");
            return Err(ServiceError::rejected(
                "register_admin",
                RejectReason::AlreadyHasAdmin,
            ));
        }

        let message = self.session.factory().register_admin().await?;
        tracing::info!(identity = %self.session.identity(), "Registered as factory admin");
        Ok(self.session.confirm(message)?)
    }

    /// Hand the admin role to `new_admin`. The caller's authorization is
    /// looked up again afterwards instead of being assumed.
    pub async fn transfer_admin(&self, new_admin: &Principal) -> Result<AdminTransfer, ServiceError> {
        self.authorize("change_admin").await?;

        let message = self.session.factory().change_admin(new_admin).await?;
        tracing::info!(from = %self.session.identity(), to = %new_admin, "Admin role transferred");

        let caller_still_admin = self.check_authorization().await?;
        Ok(AdminTransfer {
            message,
            new_admin: new_admin.clone(),
            caller_still_admin,
        })
    }

    // =========================================================================
    // Factory Configuration
    // =========================================================================

    /// Point the factory at the ledger it charges creation fees on.
    pub async fn bind_token_canister(&self, ledger: &Principal) -> Result<String, ServiceError> {
        self.authorize("set_token_canister").await?;
        let message = self.session.factory().set_token_canister(ledger).await?;
        tracing::info!(ledger = %ledger, "Token canister bound");
        Ok(self.session.confirm(message)?)
    }

    /// Upload the module installed for newly created token ledgers. The
    /// payload is sent whole in a single call.
    pub async fn submit_module_upgrade(&self, module: &[u8]) -> Result<String, ServiceError> {
        if module.is_empty() {
            return Err(ValidationError::EmptyModule.into());
        }
        self.authorize("update_wasm_module").await?;
        let message = self.session.factory().update_upgrade_module(module).await?;
        tracing::info!(bytes = module.len(), "Upgrade module submitted");
        Ok(self.session.confirm(message)?)
    }

    // =========================================================================
    // Faucet Review
    // =========================================================================

    pub async fn approve_faucet_request(
        &self,
        requests: &mut RequestLedger,
        request_id: &RequestId,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.review(requests, request_id, Decision::Approved).await
    }

    pub async fn reject_faucet_request(
        &self,
        requests: &mut RequestLedger,
        request_id: &RequestId,
    ) -> Result<TransitionOutcome, TransitionError> {
        self.review(requests, request_id, Decision::Rejected).await
    }

    async fn review(
        &self,
        requests: &mut RequestLedger,
        request_id: &RequestId,
        decision: Decision,
    ) -> Result<TransitionOutcome, TransitionError> {
        requests.transition(self, request_id, decision).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ADMIN, FACTORY, ScriptedTransport, USER, principal};
    use serde_json::json;

    const MUTATIONS: [&str; 4] = [
        "register_admin",
        "change_admin",
        "set_token_canister",
        "update_wasm_module",
    ];

    fn no_mutations(scripted: &ScriptedTransport) -> bool {
        scripted
            .methods()
            .iter()
            .all(|m| !MUTATIONS.contains(&m.as_str()))
    }

    #[tokio::test]
    async fn test_check_authorization() {
        let scripted = ScriptedTransport::new();
        scripted.reply("get_admin", json!({ "Ok": ADMIN }));

        let (_c, admin_session) = scripted.session_for(ADMIN);
        assert!(AdminGovernance::new(admin_session).check_authorization().await.unwrap());

        let (_c, user_session) = scripted.session_for(USER);
        assert!(!AdminGovernance::new(user_session).check_authorization().await.unwrap());
    }

    #[tokio::test]
    async fn test_unset_admin_markers() {
        for marker in ["aaaaa-aa", "2vxsx-fae", FACTORY] {
            let scripted = ScriptedTransport::new();
            scripted.reply("get_admin", json!({ "Ok": marker }));
            let (_c, session) = scripted.session_for(USER);
            assert_eq!(AdminGovernance::new(session).current_admin().await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_non_admin_mutations_denied_without_remote_call() {
        let scripted = ScriptedTransport::new();
        scripted.reply("get_admin", json!({ "Ok": ADMIN }));
        let (_c, session) = scripted.session_for(USER);
        let governance = AdminGovernance::new(session);

        let err = governance.transfer_admin(&principal(USER)).await.unwrap_err();
        assert!(err.is_not_authorized());
        let err = governance.bind_token_canister(&principal(FACTORY)).await.unwrap_err();
        assert!(err.is_not_authorized());
        let err = governance.submit_module_upgrade(b"\0asm").await.unwrap_err();
        assert!(err.is_not_authorized());

        assert!(no_mutations(&scripted));
    }

    #[tokio::test]
    async fn test_register_when_admin_exists() {
        let scripted = ScriptedTransport::new();
        scripted.reply("get_admin", json!({ "Ok": ADMIN }));
        let (_c, session) = scripted.session_for(USER);

        let err = AdminGovernance::new(session).register_as_admin().await.unwrap_err();
        assert_eq!(err.reject_reason(), Some(&RejectReason::AlreadyHasAdmin));
        assert!(no_mutations(&scripted));
    }

    #[tokio::test]
    async fn test_register_first_admin() {
        let scripted = ScriptedTransport::new();
        scripted.reply("get_admin", json!({ "Ok": "aaaaa-aa" }));
        scripted.reply("register_admin", json!({ "Ok": "Admin registered" }));
        let (_c, session) = scripted.session_for(USER);

        let message = AdminGovernance::new(session).register_as_admin().await.unwrap();
        assert_eq!(message, "Admin registered");
        assert_eq!(scripted.count("register_admin"), 1);
    }

    #[tokio::test]
    async fn test_transfer_rechecks_authorization() {
        let scripted = ScriptedTransport::new();
        scripted
            .reply("get_admin", json!({ "Ok": ADMIN }))
            .reply("get_admin", json!({ "Ok": USER }));
        scripted.reply("change_admin", json!({ "Ok": "Admin changed" }));
        let (_c, session) = scripted.session_for(ADMIN);

        let transfer = AdminGovernance::new(session)
            .transfer_admin(&principal(USER))
            .await
            .unwrap();
        assert!(!transfer.caller_still_admin);
        assert_eq!(
            scripted.methods(),
            vec!["get_admin", "change_admin", "get_admin"]
        );
    }

    #[tokio::test]
    async fn test_empty_module_rejected_before_any_call() {
        let scripted = ScriptedTransport::new();
        let (_c, session) = scripted.session_for(ADMIN);
        let err = AdminGovernance::new(session)
            .submit_module_upgrade(&[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::EmptyModule)
        ));
        assert!(scripted.calls().is_empty());
    }

    #[tokio::test]
    async fn test_module_upload_is_base64() {
        let scripted = ScriptedTransport::new();
        scripted.reply("get_admin", json!({ "Ok": ADMIN }));
        scripted.reply("update_wasm_module", json!({ "Ok": "Module updated" }));
        let (_c, session) = scripted.session_for(ADMIN);

        AdminGovernance::new(session)
            .submit_module_upgrade(&[0, 97, 115, 109])
            .await
            .unwrap();
        let upload = scripted
            .calls()
            .into_iter()
            .find(|c| c.method == "update_wasm_module")
            .unwrap();
        assert_eq!(upload.args, json!(["AGFzbQ=="]));
    }
}
