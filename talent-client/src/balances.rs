//! Balance aggregation across per-token ledgers.
//!
//! Each token's balance lives on its own ledger. The aggregator fetches them
//! concurrently and keeps going when one fetch fails: the entry is left out
//! of the report and the failure is recorded as a warning.

use std::collections::HashSet;
use std::sync::Arc;

use futures::{Stream, StreamExt, stream};
use talent_core::ServiceError;
use talent_core::config::BalanceSettings;
use talent_core::models::{TokenBalance, TokenId};

use crate::session::Session;

/// One per-token fetch, tagged with its position in the input.
#[derive(Debug)]
pub struct BalanceAttempt {
    pub index: usize,
    pub token_id: TokenId,
    pub result: Result<u128, ServiceError>,
}

/// A token whose balance could not be fetched.
#[derive(Debug)]
pub struct BalanceWarning {
    pub token_id: TokenId,
    pub error: ServiceError,
}

#[derive(Debug, Default)]
pub struct BalanceReport {
    /// Successful fetches, in the order the tokens were enumerated.
    pub entries: Vec<TokenBalance>,
    pub warnings: Vec<BalanceWarning>,
}

impl BalanceReport {
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn amount_of(&self, token_id: &TokenId) -> Option<u128> {
        self.entries
            .iter()
            .find(|e| &e.token_id == token_id)
            .map(|e| e.amount)
    }
}

#[derive(Clone)]
pub struct BalanceAggregator {
    session: Arc<Session>,
    concurrency: usize,
}

impl BalanceAggregator {
    pub fn new(session: Arc<Session>, settings: &BalanceSettings) -> Self {
        Self {
            session,
            concurrency: settings.concurrency.max(1),
        }
    }

    /// Report every token the factory says the caller has interacted with.
    ///
    /// Failing to enumerate the tokens fails the whole call; failing to
    /// fetch an individual balance does not.
    pub async fn aggregate(&self) -> Result<BalanceReport, ServiceError> {
        self.session.ensure_current()?;
        let token_ids: Vec<TokenId> = self
            .session
            .factory()
            .list_all_balances_for_caller()
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        self.aggregate_for(token_ids).await
    }

    /// Report the given tokens. Duplicates are fetched once.
    pub async fn aggregate_for(&self, token_ids: Vec<TokenId>) -> Result<BalanceReport, ServiceError> {
        self.session.ensure_current()?;

        let mut seen = HashSet::new();
        let token_ids: Vec<TokenId> = token_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        let mut attempts: Vec<BalanceAttempt> = self.attempts(token_ids).collect().await;
        attempts.sort_by_key(|a| a.index);
        let attempts = self.session.confirm(attempts)?;

        let holder = self.session.identity();
        let mut report = BalanceReport::default();
        for attempt in attempts {
            match attempt.result {
                Ok(amount) => report.entries.push(TokenBalance {
                    token_id: attempt.token_id,
                    holder: holder.clone(),
                    amount,
                }),
                Err(error) => {
                    tracing::warn!(token = %attempt.token_id, error = %error, "Balance fetch failed; entry omitted");
                    report.warnings.push(BalanceWarning {
                        token_id: attempt.token_id,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            entries = report.entries.len(),
            warnings = report.warnings.len(),
            "Balances aggregated"
        );
        Ok(report)
    }

    /// Lazy stream of per-token fetches, at most `concurrency` in flight,
    /// yielded in completion order. Nothing runs until it is polled, and
    /// calling this again starts a fresh set of fetches.
    pub fn attempts(&self, token_ids: Vec<TokenId>) -> impl Stream<Item = BalanceAttempt> + Send + 'static {
        let session = self.session.clone();
        stream::iter(token_ids.into_iter().enumerate())
            .map(move |(index, token_id)| {
                let ledger = session.token_ledger(token_id.clone());
                let holder = session.identity().clone();
                async move {
                    let result = ledger.balance_of(&holder).await;
                    BalanceAttempt {
                        index,
                        token_id,
                        result,
                    }
                }
            })
            .buffer_unordered(self.concurrency)
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
}
