//! Profile operations for the current session.

use std::sync::Arc;

use talent_core::ServiceError;
use talent_core::error::RejectReason;
use talent_core::models::{Principal, Profile};
use validator::Validate;

use crate::session::Session;

#[derive(Clone)]
pub struct ProfileDesk {
    session: Arc<Session>,
}

impl ProfileDesk {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// The identity the profile service sees for this session.
    pub async fn whoami(&self) -> Result<Principal, ServiceError> {
        self.session.ensure_current()?;
        let identity = self.session.profile().whoami().await?;
        Ok(self.session.confirm(identity)?)
    }

    /// The caller's profile, or `None` if they have not created one.
    pub async fn my_profile(&self) -> Result<Option<Profile>, ServiceError> {
        self.session.ensure_current()?;
        let profile = not_found_as_none(self.session.profile().get_profile().await)?;
        Ok(self.session.confirm(profile)?)
    }

    pub async fn create_profile(&self, profile: &Profile) -> Result<String, ServiceError> {
        profile.validate()?;
        self.session.ensure_current()?;
        let message = self.session.profile().create_profile(profile).await?;
        tracing::info!(identity = %self.session.identity(), "Profile created");
        Ok(self.session.confirm(message)?)
    }

    pub async fn update_profile(&self, profile: &Profile) -> Result<String, ServiceError> {
        profile.validate()?;
        self.session.ensure_current()?;
        let message = self.session.profile().update_profile(profile).await?;
        tracing::info!(identity = %self.session.identity(), "Profile updated");
        Ok(self.session.confirm(message)?)
    }

    pub async fn profile_of(&self, identity: &Principal) -> Result<Option<Profile>, ServiceError> {
        self.session.ensure_current()?;
        let profile =
            not_found_as_none(self.session.profile().get_profile_by_identity(identity).await)?;
        Ok(self.session.confirm(profile)?)
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>, ServiceError> {
        self.session.ensure_current()?;
        let profiles = self.session.profile().list_profiles().await?;
        Ok(self.session.confirm(profiles)?)
    }
}

pub(crate) fn not_found_as_none<T>(result: Result<T, ServiceError>) -> Result<Option<T>, ServiceError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if matches!(err.reject_reason(), Some(RejectReason::NotFound(_))) => Ok(None),
        Err(err) => Err(err),
    }
}
