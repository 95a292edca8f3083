//! Hexagonal ports implemented by the adapter crates.

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    domain::{Language, QuoteSnapshot, UserId},
    errors::{AdapterError, QuotaStoreError},
};

/// Real-time quote provider.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch(&self, symbol: &str) -> Result<QuoteSnapshot, AdapterError>;
}

/// Vision-capable model that turns a chart image into a report.
///
/// Implementations return the report with surrounding whitespace and any
/// enclosing code fence removed, and `NoData` when nothing is left.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(&self, image: &[u8], language: Language) -> Result<String, AdapterError>;
}

/// Result of an atomic check-and-increment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaOutcome {
    /// The slot was granted; carries the count after the increment.
    Allowed(u32),
    /// Limit already reached; carries the unchanged count.
    Denied(u32),
}

/// Per-user, per-day counter storage.
///
/// `try_consume` must be atomic: implementations either serialize access
/// per key or delegate to a storage-level conditional increment.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn try_consume(
        &self,
        user_id: UserId,
        date: NaiveDate,
        limit: u32,
    ) -> Result<QuotaOutcome, QuotaStoreError>;

    async fn peek(&self, user_id: UserId, date: NaiveDate) -> Result<u32, QuotaStoreError>;
}

/// Durable backing for the session store (language preference only).
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn load(&self, user_id: UserId) -> Result<Option<Language>, QuotaStoreError>;
    async fn save(&self, user_id: UserId, language: Language) -> Result<(), QuotaStoreError>;
}

/// Fetches an uploaded image from the chat transport into a local file.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn download(&self, file_id: &str, dest: &Path) -> Result<(), AdapterError>;
}
