//! Profile service proxy.

use super::{ServiceEndpoint, ServiceGateway, wire};
use crate::error::ServiceError;
use crate::models::{Principal, Profile};

/// Typed access to the identity/profile store.
#[derive(Clone)]
pub struct ProfileService {
    gateway: ServiceGateway,
    endpoint: ServiceEndpoint,
}

impl ProfileService {
    pub fn new(gateway: ServiceGateway) -> Self {
        Self {
            gateway,
            endpoint: ServiceEndpoint::Profile,
        }
    }

    /// The identity the service sees behind the current transport.
    pub async fn whoami(&self) -> Result<Principal, ServiceError> {
        self.gateway.query_as(&self.endpoint, "whoami", vec![]).await
    }

    /// The caller's own profile.
    pub async fn get_profile(&self) -> Result<Profile, ServiceError> {
        self.gateway.call_as(&self.endpoint, "get_user", vec![]).await
    }

    pub async fn create_profile(&self, profile: &Profile) -> Result<String, ServiceError> {
        let args = vec![wire::encode("create_user", profile)?];
        self.gateway.call_as(&self.endpoint, "create_user", args).await
    }

    pub async fn update_profile(&self, profile: &Profile) -> Result<String, ServiceError> {
        let args = vec![wire::encode("update_user", profile)?];
        self.gateway.call_as(&self.endpoint, "update_user", args).await
    }

    pub async fn get_profile_by_identity(
        &self,
        identity: &Principal,
    ) -> Result<Profile, ServiceError> {
        let args = vec![wire::encode_principal(identity)];
        self.gateway
            .call_as(&self.endpoint, "get_user_by_id", args)
            .await
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>, ServiceError> {
        self.gateway
            .call_as(&self.endpoint, "get_user_list", vec![])
            .await
    }
}
