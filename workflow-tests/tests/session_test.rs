//! Session Lifecycle Workflow Tests
//!
//! Handles are bound to the session that created them. Signing out or in as
//! someone else makes them stale.

mod common;

use talent_client::TalentClient;
use talent_core::error::InvariantViolation;
use talent_core::ServiceError;

fn is_stale(err: &ServiceError) -> bool {
    matches!(err, ServiceError::Invariant(InvariantViolation::StaleSession))
}

#[tokio::test]
async fn test_sign_in_with_whoami_uses_caller_identity() {
    let ctx = common::setup();
    let client = TalentClient::new(ctx.config.clone());

    let session = client
        .sign_in_with_whoami(ctx.market.connect_as(&ctx.user_id))
        .await
        .unwrap();

    assert_eq!(session.identity(), &ctx.user_id);
    assert_eq!(session.factory_principal(), ctx.market.factory_principal());
    assert_eq!(
        client.profiles().unwrap().whoami().await.unwrap(),
        ctx.user_id
    );
}

#[tokio::test]
async fn test_sign_out_invalidates_handles() {
    let ctx = common::setup();
    let client = ctx.user_client();
    let tokens = client.tokens().unwrap();
    tokens.list_tokens().await.unwrap();

    client.sign_out();

    assert_eq!(
        client.tokens().err(),
        Some(InvariantViolation::NoActiveSession)
    );
    let calls_before = ctx.market.calls().len();
    let err = tokens.list_tokens().await.unwrap_err();
    assert!(is_stale(&err));
    assert_eq!(ctx.market.calls().len(), calls_before);
}

#[tokio::test]
async fn test_switching_identity_invalidates_old_handles() {
    let ctx = common::setup();
    ctx.fund(&ctx.user_id, 100);
    let client = ctx.user_client();
    let old_balances = client.balances().unwrap();
    assert_eq!(old_balances.platform_balance().await.unwrap(), 100);

    client.sign_in(ctx.admin_id.clone(), ctx.market.connect_as(&ctx.admin_id));

    assert!(is_stale(&old_balances.platform_balance().await.unwrap_err()));
    assert_eq!(
        client.balances().unwrap().platform_balance().await.unwrap(),
        0
    );
    assert_eq!(client.session().unwrap().identity(), &ctx.admin_id);
}

#[tokio::test]
async fn test_handles_outliving_their_client_are_stale() {
    let ctx = common::setup();
    let profiles = ctx.user_client().profiles().unwrap();

    let err = profiles.whoami().await.unwrap_err();
    assert!(is_stale(&err));
    assert!(ctx.market.calls().is_empty());
}
