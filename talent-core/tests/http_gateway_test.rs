//! HTTP transport behaviour against a mock marketplace endpoint.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use talent_core::error::{RejectReason, ServiceError, TransportError};
use talent_core::gateway::{HttpTransport, HttpTransportConfig, ServiceGateway};
use talent_core::models::Principal;
use talent_core::secrecy::Secret;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway_for(server: &MockServer, credential: Option<&str>) -> ServiceGateway {
    let base = server.uri();
    let config = HttpTransportConfig {
        profile_url: format!("{}/profile", base),
        factory_url: format!("{}/factory", base),
        ledger_url: format!("{}/ledger", base),
        token_ledger_url: format!("{}/token", base),
        connect_timeout: Duration::from_secs(1),
        request_timeout: Duration::from_millis(500),
    };
    let transport = HttpTransport::new(config, credential.map(|c| Secret::new(c.to_string())))
        .expect("transport");
    ServiceGateway::new(Arc::new(transport))
}

#[tokio::test]
async fn test_get_admin_unwraps_ok_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/factory/get_admin"))
        .and(body_json(json!([])))
        .and(header_exists("x-request-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Ok": "rrkah-fqaaa-aaaaa-aaaaq-cai" })))
        .expect(1)
        .mount(&server)
        .await;

    let admin = gateway_for(&server, None).factory().get_admin().await.unwrap();
    assert_eq!(admin, Principal::parse("rrkah-fqaaa-aaaaa-aaaaq-cai").unwrap());
}

#[tokio::test]
async fn test_err_envelope_becomes_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/factory/register_admin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Err": "Admin already registered" })))
        .mount(&server)
        .await;

    let err = gateway_for(&server, None)
        .factory()
        .register_admin()
        .await
        .unwrap_err();
    assert_eq!(err.reject_reason(), Some(&RejectReason::AlreadyHasAdmin));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_server_error_is_retryable_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ledger/icrc1_balance_of"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = gateway_for(&server, None)
        .ledger()
        .balance_of(&Principal::anonymous())
        .await
        .unwrap_err();
    match &err {
        ServiceError::Transport(TransportError::Status { status, body, .. }) => {
            assert_eq!(*status, 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_non_json_body_is_malformed_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/profile/whoami"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = gateway_for(&server, None).profile().whoami().await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Transport(TransportError::MalformedResponse { .. })
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/factory/get_list_of_tokens"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "Ok": [] }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = gateway_for(&server, None)
        .factory()
        .list_tokens()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Transport(TransportError::Timeout { .. })
    ));
}

#[tokio::test]
async fn test_token_ledger_path_and_bearer_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token/rrkah-fqaaa-aaaaa-aaaaq-cai/icrc1_balance_of"))
        .and(header("authorization", "Bearer delegation-123"))
        .and(body_json(json!([{ "owner": "2vxsx-fae", "subaccount": [] }])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("42")))
        .expect(1)
        .mount(&server)
        .await;

    let token = Principal::parse("rrkah-fqaaa-aaaaa-aaaaq-cai").unwrap();
    let balance = gateway_for(&server, Some("delegation-123"))
        .token_ledger(token)
        .balance_of(&Principal::anonymous())
        .await
        .unwrap();
    assert_eq!(balance, 42);
}

#[tokio::test]
async fn test_icrc_insufficient_funds_is_structured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ledger/icrc1_transfer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Err": { "InsufficientFunds": { "balance": "7" } }
        })))
        .mount(&server)
        .await;

    let args = talent_core::gateway::TransferArgs::new(Principal::management(), 10);
    let err = gateway_for(&server, None)
        .ledger()
        .transfer(&args)
        .await
        .unwrap_err();
    assert_eq!(
        err.reject_reason(),
        Some(&RejectReason::InsufficientFunds { balance: Some(7) })
    );
}
