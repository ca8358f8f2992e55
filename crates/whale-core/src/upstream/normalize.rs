//! Translation of provider payloads into [`WhaleTransaction`] records.
//!
//! Providers disagree on field names and on whether numbers arrive as JSON numbers or
//! strings, so every lookup accepts a small set of aliases. Records that cannot be
//! trusted are dropped one by one; only a payload with no recognizable transaction
//! list fails as a whole.

use crate::{
    types::{Page, PageKey, WhaleTransaction, UNKNOWN},
    upstream::UpstreamError,
};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::warn;

const LIST_FIELDS: &[&str] = &["transactions", "data", "result"];
const TOTAL_PAGES_FIELDS: &[&str] = &["total_pages", "totalPages", "pages"];
const HASH_FIELDS: &[&str] = &["hash", "id"];
const TIMESTAMP_FIELDS: &[&str] = &["timestamp", "time"];
const VALUE_FIELDS: &[&str] = &["value", "amount_usd", "amount"];
const CHAIN_FIELDS: &[&str] = &["blockchain", "chain"];
const ADDRESS_FIELDS: &[&str] = &["address", "owner"];

/// Why a single record was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NotAnObject,
    MissingHash,
    MissingTimestamp,
    MissingValue,
    NegativeValue,
    BelowThreshold,
}

impl DropReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAnObject => "not_an_object",
            Self::MissingHash => "missing_hash",
            Self::MissingTimestamp => "missing_timestamp",
            Self::MissingValue => "missing_value",
            Self::NegativeValue => "negative_value",
            Self::BelowThreshold => "below_threshold",
        }
    }
}

/// Result of normalizing one payload.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub page: Page,
    pub dropped: Vec<DropReason>,
}

/// Normalizes a raw provider body for `key`.
///
/// # Errors
///
/// Returns [`UpstreamError::InvalidResponse`] if the body is not JSON or contains no
/// transaction list.
pub fn normalize_body(key: PageKey, body: &[u8]) -> Result<Normalized, UpstreamError> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| UpstreamError::InvalidResponse(format!("body is not JSON: {e}")))?;
    normalize_payload(key, &payload)
}

/// Normalizes an already parsed provider payload for `key`.
///
/// # Errors
///
/// Returns [`UpstreamError::InvalidResponse`] if no transaction list is present.
pub fn normalize_payload(key: PageKey, payload: &Value) -> Result<Normalized, UpstreamError> {
    let (records, total_pages) = match payload {
        Value::Array(records) => (records, 1),
        Value::Object(map) => {
            let records = LIST_FIELDS
                .iter()
                .find_map(|field| map.get(*field).and_then(Value::as_array))
                .ok_or_else(|| {
                    UpstreamError::InvalidResponse("no transaction list in payload".to_string())
                })?;
            (records, total_pages_of(map))
        }
        _ => {
            return Err(UpstreamError::InvalidResponse(
                "payload is neither an object nor an array".to_string(),
            ))
        }
    };

    let mut transactions = Vec::with_capacity(records.len());
    let mut dropped = Vec::new();

    for record in records {
        match normalize_record(record, key.threshold()) {
            Ok(tx) => transactions.push(tx),
            Err(reason) => {
                let hash = record.get("hash").and_then(Value::as_str).unwrap_or("");
                warn!(
                    key = %key,
                    reason = reason.as_str(),
                    hash,
                    "dropping upstream transaction record"
                );
                dropped.push(reason);
            }
        }
    }

    Ok(Normalized { page: Page::new(key, transactions, total_pages), dropped })
}

fn normalize_record(record: &Value, threshold: Decimal) -> Result<WhaleTransaction, DropReason> {
    let map = record.as_object().ok_or(DropReason::NotAnObject)?;

    let hash = first(map, HASH_FIELDS)
        .and_then(as_text)
        .filter(|h| !h.is_empty())
        .ok_or(DropReason::MissingHash)?;

    let timestamp =
        first(map, TIMESTAMP_FIELDS).and_then(as_timestamp).ok_or(DropReason::MissingTimestamp)?;

    let value = first(map, VALUE_FIELDS).and_then(as_decimal).ok_or(DropReason::MissingValue)?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(DropReason::NegativeValue);
    }
    if value < threshold {
        return Err(DropReason::BelowThreshold);
    }

    Ok(WhaleTransaction {
        hash,
        timestamp,
        from: map.get("from").and_then(as_address).unwrap_or_else(|| UNKNOWN.to_string()),
        to: map.get("to").and_then(as_address).unwrap_or_else(|| UNKNOWN.to_string()),
        value: value.normalize(),
        chain: first(map, CHAIN_FIELDS).and_then(as_text).unwrap_or_else(|| UNKNOWN.to_string()),
    })
}

fn first<'a>(map: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a Value> {
    fields.iter().find_map(|field| map.get(*field).filter(|v| !v.is_null()))
}

fn total_pages_of(map: &Map<String, Value>) -> u32 {
    first(map, TOTAL_PAGES_FIELDS)
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        })
        .map_or(1, |n| u32::try_from(n).unwrap_or(u32::MAX).max(1))
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            #[allow(clippy::cast_possible_truncation)]
            n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text)).ok()
        }
        Value::String(s) => {
            let text = s.trim();
            Decimal::from_str(text).or_else(|_| Decimal::from_scientific(text)).ok()
        }
        _ => None,
    }
}

fn as_address(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => {
            first(map, ADDRESS_FIELDS).and_then(as_text).filter(|a| !a.is_empty())
        }
        _ => None,
    }
}
