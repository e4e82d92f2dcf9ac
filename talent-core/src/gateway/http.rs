//! JSON-over-HTTP transport.
//!
//! Each call is a `POST {base}/{method}` with the positional argument array
//! as body. Per-token ledgers live under `{token_ledger_url}/{token_id}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;

use super::{ServiceEndpoint, Transport};
use crate::config::Config;
use crate::error::{SetupError, TransportError};
use crate::observability::TracedClientExt;

/// Configuration for the HTTP transport.
#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    pub profile_url: String,
    pub factory_url: String,
    pub ledger_url: String,
    pub token_ledger_url: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout.
    pub request_timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            profile_url: "http://localhost:4943/profile".to_string(),
            factory_url: "http://localhost:4943/factory".to_string(),
            ledger_url: "http://localhost:4943/ledger".to_string(),
            token_ledger_url: "http://localhost:4943/token".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl HttpTransportConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            profile_url: config.services.profile.url.clone(),
            factory_url: config.services.factory.url.clone(),
            ledger_url: config.services.ledger.url.clone(),
            token_ledger_url: config.services.token_ledger_url.clone(),
            connect_timeout: Duration::from_millis(config.gateway.connect_timeout_ms),
            request_timeout: Duration::from_millis(config.gateway.request_timeout_ms),
        }
    }
}

/// Production transport. The optional credential is the caller's delegated
/// identity, sent as a bearer token.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    profile_url: String,
    factory_url: String,
    ledger_url: String,
    token_ledger_url: String,
    credential: Option<Secret<String>>,
}

impl HttpTransport {
    /// Create a new transport with the given configuration.
    pub fn new(
        config: HttpTransportConfig,
        credential: Option<Secret<String>>,
    ) -> Result<Self, SetupError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            profile_url: base_url(&config.profile_url)?,
            factory_url: base_url(&config.factory_url)?,
            ledger_url: base_url(&config.ledger_url)?,
            token_ledger_url: base_url(&config.token_ledger_url)?,
            credential,
        })
    }

    fn url_for(&self, endpoint: &ServiceEndpoint, method: &str) -> String {
        match endpoint {
            ServiceEndpoint::Profile => format!("{}/{}", self.profile_url, method),
            ServiceEndpoint::Factory => format!("{}/{}", self.factory_url, method),
            ServiceEndpoint::Ledger => format!("{}/{}", self.ledger_url, method),
            ServiceEndpoint::TokenLedger(id) => {
                format!("{}/{}/{}", self.token_ledger_url, id, method)
            }
        }
    }
}

fn base_url(raw: &str) -> Result<String, SetupError> {
    let url = Url::parse(raw).map_err(|e| SetupError::InvalidEndpoint {
        url: raw.to_string(),
        message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SetupError::InvalidEndpoint {
            url: raw.to_string(),
            message: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn map_send_error(endpoint: &ServiceEndpoint, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            endpoint: endpoint.clone(),
        }
    } else {
        TransportError::Unreachable {
            endpoint: endpoint.clone(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn invoke(
        &self,
        endpoint: &ServiceEndpoint,
        method: &str,
        args: Value,
    ) -> Result<Value, TransportError> {
        let url = self.url_for(endpoint, method);
        let request_id = uuid::Uuid::new_v4().to_string();

        let mut request = self.client.traced_post(&url).json(&args);
        if let Some(credential) = &self.credential {
            request = request.bearer_auth(credential.expose_secret());
        }

        let response = request
            .send(&request_id)
            .await
            .map_err(|e| map_send_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                endpoint: endpoint.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| map_send_error(endpoint, e))?;
        serde_json::from_slice(&body).map_err(|e| TransportError::malformed(method, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Principal;

    #[test]
    fn test_urls_per_endpoint() {
        let transport = HttpTransport::new(
            HttpTransportConfig {
                factory_url: "http://localhost:9000/factory/".to_string(),
                ..Default::default()
            },
            None,
        )
        .unwrap();

        assert_eq!(
            transport.url_for(&ServiceEndpoint::Factory, "get_admin"),
            "http://localhost:9000/factory/get_admin"
        );
        let token = Principal::parse("rrkah-fqaaa-aaaaa-aaaaq-cai").unwrap();
        assert_eq!(
            transport.url_for(&ServiceEndpoint::TokenLedger(token), "icrc1_balance_of"),
            "http://localhost:4943/token/rrkah-fqaaa-aaaaa-aaaaq-cai/icrc1_balance_of"
        );
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        let result = HttpTransport::new(
            HttpTransportConfig {
                ledger_url: "ftp://example.com/ledger".to_string(),
                ..Default::default()
            },
            None,
        );
        assert!(matches!(result, Err(SetupError::InvalidEndpoint { .. })));
    }
}
