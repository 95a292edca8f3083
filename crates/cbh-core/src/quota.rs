//! Daily analysis quota.
//!
//! The ledger is the only component that mutates quota state, and it does so
//! exclusively through [`QuotaStore::try_consume`]. A missing or failing store
//! puts the ledger into fail-open mode: the request proceeds and the
//! condition is logged.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use tokio::sync::Mutex;
use tracing::warn;

use crate::{
    domain::UserId,
    errors::QuotaStoreError,
    ports::{QuotaOutcome, QuotaStore},
};

/// In-process quota store.
///
/// The whole read-compare-increment runs under a single lock acquisition,
/// which makes `try_consume` linearizable for every key.
#[derive(Default)]
pub struct MemoryQuotaStore {
    counts: Mutex<HashMap<(UserId, NaiveDate), u32>>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn set_count(&self, user_id: UserId, date: NaiveDate, count: u32) {
        self.counts.lock().await.insert((user_id, date), count);
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn try_consume(
        &self,
        user_id: UserId,
        date: NaiveDate,
        limit: u32,
    ) -> Result<QuotaOutcome, QuotaStoreError> {
        let mut counts = self.counts.lock().await;
        let current = counts.get(&(user_id, date)).copied().unwrap_or(0);
        if current >= limit {
            return Ok(QuotaOutcome::Denied(current));
        }
        let next = current + 1;
        counts.insert((user_id, date), next);
        Ok(QuotaOutcome::Allowed(next))
    }

    async fn peek(&self, user_id: UserId, date: NaiveDate) -> Result<u32, QuotaStoreError> {
        Ok(self
            .counts
            .lock()
            .await
            .get(&(user_id, date))
            .copied()
            .unwrap_or(0))
    }
}

/// Decision returned to the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    Allowed(u32),
    Denied(u32),
    /// No store, or the store failed: proceed without enforcement.
    Unenforced,
}

/// Snapshot for the `/user` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Usage {
    pub used: u32,
    pub remaining: u32,
    pub limit: u32,
}

#[derive(Clone)]
pub struct QuotaLedger {
    store: Option<Arc<dyn QuotaStore>>,
    limit: u32,
}

impl QuotaLedger {
    pub fn new(store: Option<Arc<dyn QuotaStore>>, limit: u32) -> Self {
        Self { store, limit }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn is_enforced(&self) -> bool {
        self.store.is_some()
    }

    /// Current calendar day in the bot's local timezone.
    pub fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    pub async fn try_consume(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<QuotaOutcome, QuotaStoreError> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| QuotaStoreError::Unavailable("no quota store configured".into()))?;
        store.try_consume(user_id, date, self.limit).await
    }

    pub async fn peek(&self, user_id: UserId, date: NaiveDate) -> Result<u32, QuotaStoreError> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| QuotaStoreError::Unavailable("no quota store configured".into()))?;
        store.peek(user_id, date).await
    }

    /// Charge one analysis for today, failing open on store problems.
    pub async fn gate(&self, user_id: UserId) -> Gate {
        let today = self.today();
        match self.try_consume(user_id, today).await {
            Ok(QuotaOutcome::Allowed(n)) => Gate::Allowed(n),
            Ok(QuotaOutcome::Denied(n)) => Gate::Denied(n),
            Err(e) => {
                warn!(user = %user_id, date = %today, error = %e, "quota check skipped (fail-open)");
                Gate::Unenforced
            }
        }
    }

    pub async fn usage(&self, user_id: UserId) -> Result<Usage, QuotaStoreError> {
        let used = self.peek(user_id, self.today()).await?;
        Ok(Usage {
            used,
            remaining: self.limit.saturating_sub(used),
            limit: self.limit,
        })
    }
}
