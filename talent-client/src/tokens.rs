//! Talent token operations for the current session.
//!
//! Creation and purchase debit the caller's platform balance through the
//! factory, so both run through the `ApprovalCoordinator` with the factory
//! principal as spender.

use std::sync::Arc;

use futures::future::join_all;
use talent_core::ServiceError;
use talent_core::config::ApprovalSettings;
use talent_core::error::ValidationError;
use talent_core::gateway::TransferArgs;
use talent_core::models::{Principal, Profile, TalentToken, TokenId, TokenMetadata, TokenSpec};
use validator::Validate;

use crate::approval::{ApprovalCoordinator, SpendOutcome, SpendPlan};
use crate::profiles::not_found_as_none;
use crate::session::Session;

/// Fee the factory charges for creating a token, in platform ledger base units.
pub const TOKEN_CREATION_FEE: u128 = 100;

/// A listed token joined with its owner's profile, if they have one.
#[derive(Debug, Clone)]
pub struct TokenListing {
    pub token: TalentToken,
    pub owner_profile: Option<Profile>,
}

/// Platform cost of buying `quantity` units at `unit_price`.
pub fn purchase_cost(quantity: u128, unit_price: u64) -> Result<u128, ValidationError> {
    if quantity == 0 {
        return Err(ValidationError::NonPositiveAmount);
    }
    if unit_price == 0 {
        return Err(ValidationError::UnpricedToken);
    }
    quantity
        .checked_mul(u128::from(unit_price))
        .ok_or(ValidationError::AmountOverflow)
}

#[derive(Clone)]
pub struct TokenDesk {
    session: Arc<Session>,
    coordinator: ApprovalCoordinator,
}

impl TokenDesk {
    pub fn new(session: Arc<Session>, approvals: ApprovalSettings) -> Self {
        Self {
            coordinator: ApprovalCoordinator::new(session.clone(), approvals),
            session,
        }
    }

    // =========================================================================
    // Spending Actions
    // =========================================================================

    /// Approve the creation fee for the factory, then create the token.
    pub async fn create_token(&self, spec: &TokenSpec) -> Result<SpendOutcome<TokenId>, ServiceError> {
        spec.validate()?;
        let plan = SpendPlan::new(TOKEN_CREATION_FEE, self.session.factory_principal().clone())?;

        let factory = self.session.factory().clone();
        let spec = spec.clone();
        let outcome = self
            .coordinator
            .spend_then_execute(&plan, |_| async move { factory.create_token(&spec).await })
            .await;

        if let Some(token_id) = &outcome.value {
            tracing::info!(token = %token_id, owner = %self.session.identity(), "Talent token created");
        }
        Ok(outcome)
    }

    /// Approve `quantity × unit_price` for the factory, then buy.
    ///
    /// The price is read from the factory right before approving.
    pub async fn buy_token(
        &self,
        token_id: &TokenId,
        quantity: u128,
    ) -> Result<SpendOutcome<String>, ServiceError> {
        if quantity == 0 {
            return Err(ValidationError::NonPositiveAmount.into());
        }
        let metadata = self.token_metadata(token_id).await?;
        let cost = purchase_cost(quantity, metadata.unit_price)?;
        let plan = SpendPlan::new(cost, self.session.factory_principal().clone())?;

        let factory = self.session.factory().clone();
        let token = token_id.clone();
        let outcome = self
            .coordinator
            .spend_then_execute(&plan, |_| async move { factory.buy_token(&token, quantity).await })
            .await;

        if outcome.is_success() {
            tracing::info!(token = %token_id, quantity = %quantity, cost = %cost, "Talent token purchased");
        }
        Ok(outcome)
    }

    /// Caller-signed transfer on the platform ledger. Returns the block index.
    pub async fn transfer(&self, to: &Principal, amount: u128) -> Result<u128, ServiceError> {
        if amount == 0 {
            return Err(ValidationError::NonPositiveAmount.into());
        }
        self.session.ensure_current()?;
        let block = self
            .session
            .ledger()
            .transfer(&TransferArgs::new(to.clone(), amount))
            .await?;
        tracing::info!(to = %to, amount = %amount, block = %block, "Platform transfer completed");
        Ok(self.session.confirm(block)?)
    }

    /// The caller's balance on the platform currency ledger.
    pub async fn platform_balance(&self) -> Result<u128, ServiceError> {
        self.session.ensure_current()?;
        let balance = self
            .session
            .ledger()
            .balance_of(self.session.identity())
            .await?;
        Ok(self.session.confirm(balance)?)
    }

    // =========================================================================
    // Listings
    // =========================================================================

    pub async fn list_tokens(&self) -> Result<Vec<TalentToken>, ServiceError> {
        self.session.ensure_current()?;
        let tokens = self.session.factory().list_tokens().await?;
        Ok(self.session.confirm(tokens)?)
    }

    pub async fn token_metadata(&self, token_id: &TokenId) -> Result<TokenMetadata, ServiceError> {
        self.session.ensure_current()?;
        let metadata = self.session.factory().get_token_metadata(token_id).await?;
        Ok(self.session.confirm(metadata)?)
    }

    /// The token the caller created, if any.
    pub async fn my_token(&self) -> Result<Option<TalentToken>, ServiceError> {
        self.session.ensure_current()?;
        let token = not_found_as_none(self.session.factory().get_user_token_metadata().await)?;
        Ok(self.session.confirm(token)?)
    }

    /// All tokens with their owners' profiles. A missing or unreadable
    /// profile leaves `owner_profile` empty.
    pub async fn explore(&self) -> Result<Vec<TokenListing>, ServiceError> {
        let tokens = self.list_tokens().await?;
        let profiles = self.session.profile();
        let lookups = tokens.iter().map(|token| {
            let owner = token.metadata.owner.clone();
            async move {
                match profiles.get_profile_by_identity(&owner).await {
                    Ok(profile) => Some(profile),
                    Err(err) => {
                        tracing::debug!(owner = %owner, error = %err, "Owner profile unavailable");
                        None
                    }
                }
            }
        });
        let owner_profiles = join_all(lookups).await;

        let listings = tokens
            .into_iter()
            .zip(owner_profiles)
            .map(|(token, owner_profile)| TokenListing {
                token,
                owner_profile,
            })
            .collect();
        Ok(self.session.confirm(listings)?)
    }
}
