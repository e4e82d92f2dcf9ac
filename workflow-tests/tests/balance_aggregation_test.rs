//! Balance Aggregation Workflow Tests
//!
//! Each talent token keeps balances on its own ledger. The aggregator reads
//! them all and reports per-token failures as warnings.

mod common;

use futures::StreamExt;
use talent_core::models::TokenId;
use workflow_tests::{Fault, WorkflowTestContext};

/// Three tokens owned by fresh identities; the user buys `2`, `3` and `4` units.
async fn portfolio(ctx: &WorkflowTestContext) -> Vec<TokenId> {
    let mut tokens = Vec::new();
    for (n, symbol) in [(10, "AAA"), (11, "BBB"), (12, "CCC")] {
        let owner = workflow_tests::test_principal(n);
        tokens.push(common::create_token_for(ctx, &owner, symbol, 1).await);
    }

    ctx.fund(&ctx.user_id, 100);
    let buyer = ctx.user_client();
    let desk = buyer.tokens().unwrap();
    for (quantity, token_id) in (2u128..).zip(&tokens) {
        let outcome = desk.buy_token(token_id, quantity).await.unwrap();
        assert!(outcome.is_success(), "purchase failed: {:?}", outcome);
    }
    tokens
}

#[tokio::test]
async fn test_aggregate_reports_every_token() {
    let ctx = common::setup();
    let tokens = portfolio(&ctx).await;

    let report = ctx.user_client().balances().unwrap().aggregate().await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.entries.len(), 3);
    for (quantity, token_id) in (2u128..).zip(&tokens) {
        assert_eq!(report.amount_of(token_id), Some(quantity));
    }
    assert!(report.entries.iter().all(|e| e.holder == ctx.user_id));
}

#[tokio::test]
async fn test_one_failing_ledger_becomes_a_warning() {
    let ctx = common::setup();
    let tokens = portfolio(&ctx).await;
    let broken = tokens[1].clone();
    ctx.market.inject_fault(
        &format!("token-ledger/{}/icrc1_balance_of", broken),
        Fault::Unreachable,
    );

    let report = ctx.user_client().balances().unwrap().aggregate().await.unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.entries.len(), tokens.len() - 1);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].token_id, broken);
    assert!(report.warnings[0].error.is_retryable());
    assert_eq!(report.amount_of(&broken), None);
    assert_eq!(report.amount_of(&tokens[0]), Some(2));
    assert_eq!(report.amount_of(&tokens[2]), Some(4));
}

#[tokio::test]
async fn test_entries_follow_enumeration_order() {
    let ctx = common::setup();
    let tokens = portfolio(&ctx).await;
    let user = ctx.user_client();
    let balances = user.balances().unwrap();

    let mut reversed = tokens.clone();
    reversed.reverse();
    reversed.push(tokens[0].clone());

    let report = balances.aggregate_for(reversed.clone()).await.unwrap();
    let order: Vec<TokenId> = report.entries.iter().map(|e| e.token_id.clone()).collect();
    assert_eq!(order, reversed[..3].to_vec());
}

#[tokio::test]
async fn test_enumeration_failure_fails_whole_call() {
    let ctx = common::setup();
    portfolio(&ctx).await;
    ctx.market
        .inject_fault("get_all_balances_for_caller", Fault::Timeout);

    let err = ctx
        .user_client()
        .balances()
        .unwrap()
        .aggregate()
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_attempts_are_lazy_and_restartable() {
    let ctx = common::setup();
    let tokens = portfolio(&ctx).await;
    let user = ctx.user_client();
    let balances = user.balances().unwrap();
    let before = ctx.market.count("icrc1_balance_of");

    let stream = balances.attempts(tokens.clone());
    assert_eq!(ctx.market.count("icrc1_balance_of"), before);

    let first: Vec<_> = stream.collect().await;
    let second: Vec<_> = balances.attempts(tokens.clone()).collect().await;
    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 3);
    assert_eq!(ctx.market.count("icrc1_balance_of"), before + 6);
}

#[tokio::test]
async fn test_platform_balance() {
    let ctx = common::setup();
    ctx.fund(&ctx.user_id, 321);
    let balance = ctx
        .user_client()
        .balances()
        .unwrap()
        .platform_balance()
        .await
        .unwrap();
    assert_eq!(balance, 321);
}
