//! Common test utilities for workflow integration tests.

#![allow(dead_code)]

use talent_core::models::{Principal, TokenId, TokenSpec};
use workflow_tests::{test_principal, WorkflowTestContext};

/// Create a new workflow test context with an empty marketplace.
///
/// This is the main entry point for workflow tests.
pub fn setup() -> WorkflowTestContext {
    WorkflowTestContext::new().expect("Failed to create workflow test context")
}

/// A third identity, distinct from the context's admin and user.
pub fn other_identity() -> Principal {
    test_principal(3)
}

pub fn token_spec(symbol: &str, unit_price: u64) -> TokenSpec {
    TokenSpec {
        name: format!("{} Hours", symbol),
        symbol: symbol.to_string(),
        decimals: 8,
        total_supply: 10_000,
        unit_price,
        logo: None,
    }
}

/// Fund `owner`, create a token for them, and return its id.
pub async fn create_token_for(
    ctx: &WorkflowTestContext,
    owner: &Principal,
    symbol: &str,
    unit_price: u64,
) -> TokenId {
    ctx.fund(owner, workflow_tests::CREATION_FEE);
    let client = ctx.client_for(owner);
    client
        .tokens()
        .expect("signed in")
        .create_token(&token_spec(symbol, unit_price))
        .await
        .expect("valid spec")
        .into_result()
        .expect("Failed to create token")
}
