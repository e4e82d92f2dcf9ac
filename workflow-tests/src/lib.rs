//! Marketplace workflow integration tests library.
//!
//! Provides test infrastructure for running end-to-end marketplace workflows
//! through the real client stack. Every client talks to one shared
//! `FakeMarketplace`, so state written by one identity is visible to the others.
//!
//! ## Usage
//!
//! ```bash
//! cargo test -p workflow-tests
//! ```

pub mod marketplace;

use std::sync::Once;

use anyhow::{anyhow, Result};
use talent_client::TalentClient;
use talent_core::config::Config;
use talent_core::models::Principal;

pub use marketplace::{test_principal, Fault, FakeMarketplace, RecordedCall, CREATION_FEE};

/// Principal the in-memory factory runs as.
pub const FACTORY_ID: &str = "ryjl3-tyaaa-aaaaa-aaaba-cai";

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,workflow_tests=debug,talent_client=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Client configuration pointing at the in-memory marketplace.
pub fn marketplace_config(factory: &Principal) -> Result<Config> {
    let toml = format!(
        r#"
        service_name = "workflow-tests"

        [services]
        token_ledger_url = "http://127.0.0.1:4943/token"

        [services.profile]
        url = "http://127.0.0.1:4943/profile"
        canister_id = "rrkah-fqaaa-aaaaa-aaaaq-cai"

        [services.factory]
        url = "http://127.0.0.1:4943/factory"
        canister_id = "{factory}"

        [services.ledger]
        url = "http://127.0.0.1:4943/ledger"
        canister_id = "qjdnr-maaaa-aaaaa-aaaqq-cai"
        "#
    );
    Config::from_toml_str(&toml).map_err(|e| anyhow!("Failed to build test config: {}", e))
}

/// Context for workflow tests: one marketplace, two well-known identities.
///
/// Each test should create a new context so no state leaks between tests.
pub struct WorkflowTestContext {
    pub market: FakeMarketplace,
    pub config: Config,
    /// Identity that registers as factory admin in admin workflows
    pub admin_id: Principal,
    /// Ordinary user identity
    pub user_id: Principal,
}

impl WorkflowTestContext {
    /// Create a new workflow test context with an empty marketplace.
    pub fn new() -> Result<Self> {
        init_tracing();

        let factory = Principal::parse(FACTORY_ID)?;
        let config = marketplace_config(&factory)?;

        Ok(Self {
            market: FakeMarketplace::new(factory),
            config,
            admin_id: test_principal(1),
            user_id: test_principal(2),
        })
    }

    /// Create a new client signed in as `identity`.
    pub fn client_for(&self, identity: &Principal) -> TalentClient {
        let client = TalentClient::new(self.config.clone());
        client.sign_in(identity.clone(), self.market.connect_as(identity));
        client
    }

    pub fn admin_client(&self) -> TalentClient {
        self.client_for(&self.admin_id)
    }

    pub fn user_client(&self) -> TalentClient {
        self.client_for(&self.user_id)
    }

    /// Register the admin identity as factory admin and return its client.
    pub async fn bootstrap_admin(&self) -> Result<TalentClient> {
        let admin = self.admin_client();
        admin
            .governance()?
            .register_as_admin()
            .await
            .map_err(|e| anyhow!("Failed to register admin: {}", e))?;
        Ok(admin)
    }

    /// Credit platform currency to `identity`.
    pub fn fund(&self, identity: &Principal, amount: u128) {
        self.market.mint(identity, amount);
    }
}
