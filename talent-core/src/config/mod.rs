use config::{Config as Cfg, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::SetupError;
use crate::models::Principal;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    pub services: ServicesConfig,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub approvals: ApprovalSettings,
    #[serde(default)]
    pub balances: BalanceSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    pub profile: EndpointConfig,
    pub factory: EndpointConfig,
    pub ledger: EndpointConfig,
    /// Base URL of per-token ledgers; a token is addressed as `{base}/{token_id}`.
    pub token_ledger_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EndpointConfig {
    pub url: String,
    pub canister_id: Principal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewaySettings {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ApprovalSettings {
    /// Lifetime of granted allowances; unset means they never expire.
    #[serde(default)]
    pub expiry_secs: Option<u64>,
    /// Replace an unused allowance with zero after the follow-up action fails.
    #[serde(default)]
    pub revoke_on_failure: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BalanceSettings {
    #[serde(default = "default_balance_concurrency")]
    pub concurrency: usize,
}

impl Default for BalanceSettings {
    fn default() -> Self {
        Self {
            concurrency: default_balance_concurrency(),
        }
    }
}

fn default_service_name() -> String {
    "talent-client".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_balance_concurrency() -> usize {
    8
}

impl Config {
    /// Load from an optional `talent.*` file and `TALENT__*` environment variables.
    pub fn load() -> Result<Self, SetupError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("talent").required(false))
            .add_source(Environment::with_prefix("TALENT").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, SetupError> {
        let config = Cfg::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Principal of the factory; the spender every allowance is granted to.
    pub fn factory_principal(&self) -> &Principal {
        &self.services.factory.canister_id
    }
}
