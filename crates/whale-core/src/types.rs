//! Core data model shared by the upstream client, the cache and the query service.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Placeholder used when the provider omits an address or chain identifier.
pub const UNKNOWN: &str = "unknown";

/// A single large transfer as served to dashboard clients.
///
/// Built only by upstream normalization and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhaleTransaction {
    pub hash: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub from: String,
    pub to: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    pub chain: String,
}

/// Cache key: one page of the feed at one value threshold.
///
/// The threshold is normalized on construction so `100` and `100.00` address the
/// same entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey {
    page: u32,
    threshold: Decimal,
}

impl PageKey {
    /// Builds a key, clamping `page` to at least 1 and `threshold` to at least 0.
    #[must_use]
    pub fn new(page: u32, threshold: Decimal) -> Self {
        Self { page: page.max(1), threshold: threshold.max(Decimal::ZERO).normalize() }
    }

    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub fn threshold(&self) -> Decimal {
        self.threshold
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.page, self.threshold)
    }
}

/// Errors from parsing a `page:threshold` key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageKeyParseError {
    #[error("expected `page:threshold`, got `{0}`")]
    MissingSeparator(String),

    #[error("page must be an integer >= 1, got `{0}`")]
    InvalidPage(String),

    #[error("threshold must be a non-negative number, got `{0}`")]
    InvalidThreshold(String),
}

impl FromStr for PageKey {
    type Err = PageKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (page, threshold) = trimmed
            .split_once(':')
            .ok_or_else(|| PageKeyParseError::MissingSeparator(trimmed.to_string()))?;

        let page = page
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| PageKeyParseError::InvalidPage(page.to_string()))?;

        let threshold = Decimal::from_str(threshold.trim())
            .ok()
            .filter(|t| !t.is_sign_negative())
            .ok_or_else(|| PageKeyParseError::InvalidThreshold(threshold.to_string()))?;

        Ok(Self::new(page, threshold))
    }
}

/// One normalized page of upstream results.
///
/// Transactions keep upstream order and all satisfy `value >= key.threshold()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub key: PageKey,
    pub transactions: Vec<WhaleTransaction>,
    /// Provider-reported page count at fetch time. Always at least 1.
    pub total_pages: u32,
}

impl Page {
    #[must_use]
    pub fn new(key: PageKey, transactions: Vec<WhaleTransaction>, total_pages: u32) -> Self {
        Self { key, transactions, total_pages: total_pages.max(1) }
    }

    #[must_use]
    pub fn empty(key: PageKey) -> Self {
        Self::new(key, Vec::new(), 1)
    }
}

/// JSON body of `GET /api/whale-transactions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    pub transactions: Vec<WhaleTransaction>,
    pub total_pages: u32,
}

impl TransactionsResponse {
    /// The degraded shape returned while the upstream is unavailable.
    #[must_use]
    pub fn empty() -> Self {
        Self { transactions: Vec::new(), total_pages: 1 }
    }
}

impl From<&Page> for TransactionsResponse {
    fn from(page: &Page) -> Self {
        Self { transactions: page.transactions.clone(), total_pages: page.total_pages }
    }
}
