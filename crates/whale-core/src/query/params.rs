//! Lenient parsing of client-supplied query parameters.
//!
//! Nothing here fails: every malformed or out-of-range value is replaced by a valid one
//! and the replacement is reported as a [`ParamAdjustment`].

use crate::types::PageKey;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use std::{fmt, str::FromStr};

/// Which query parameter was adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Page,
    Threshold,
}

impl Param {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Threshold => "threshold",
        }
    }
}

/// How a parameter was adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentKind {
    /// Missing or unparseable; the default was used.
    Defaulted,
    /// Parsed but outside the valid range; moved to the nearest bound.
    Clamped,
    /// Fractional page number; rounded toward zero.
    Truncated,
}

impl AdjustmentKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Defaulted => "defaulted",
            Self::Clamped => "clamped",
            Self::Truncated => "truncated",
        }
    }
}

/// A parameter value that was replaced during normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamAdjustment {
    pub param: Param,
    pub kind: AdjustmentKind,
    /// The text as received, `None` when the parameter was absent.
    pub raw: Option<String>,
}

impl ParamAdjustment {
    fn new(param: Param, kind: AdjustmentKind, raw: Option<&str>) -> Self {
        Self { param, kind, raw: raw.map(str::to_string) }
    }
}

impl fmt::Display for ParamAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.raw {
            Some(raw) => write!(f, "{} {} from `{}`", self.param.as_str(), self.kind.as_str(), raw),
            None => write!(f, "{} {} (missing)", self.param.as_str(), self.kind.as_str()),
        }
    }
}

/// Result of normalizing one request's parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedParams {
    pub key: PageKey,
    pub adjustments: Vec<ParamAdjustment>,
}

/// Normalizes raw `page` and `threshold` text into a cache key.
#[must_use]
pub fn normalize_params(
    raw_page: Option<&str>,
    raw_threshold: Option<&str>,
    default_threshold: Decimal,
) -> NormalizedParams {
    let mut adjustments = Vec::new();

    let (page, page_adjustment) = parse_page(raw_page);
    adjustments.extend(page_adjustment);

    let (threshold, threshold_adjustment) = parse_threshold(raw_threshold, default_threshold);
    adjustments.extend(threshold_adjustment);

    NormalizedParams { key: PageKey::new(page, threshold), adjustments }
}

/// Parses a page number.
///
/// | input | page | adjustment |
/// |-------|------|------------|
/// | missing, empty, `abc` | 1 | defaulted |
/// | `2.9` | 2 | truncated |
/// | `0`, `-4` | 1 | clamped |
/// | `99999999999` | `u32::MAX` | clamped |
#[must_use]
pub fn parse_page(raw: Option<&str>) -> (u32, Option<ParamAdjustment>) {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return (1, Some(ParamAdjustment::new(Param::Page, AdjustmentKind::Defaulted, raw)));
    };

    let Some(number) = parse_decimal(text) else {
        // Integer text too long for a decimal still has an obvious nearest bound.
        let (page, kind) = match integer_sign(text) {
            Some(true) => (u32::MAX, AdjustmentKind::Clamped),
            Some(false) => (1, AdjustmentKind::Clamped),
            None => (1, AdjustmentKind::Defaulted),
        };
        return (page, Some(ParamAdjustment::new(Param::Page, kind, raw)));
    };

    let truncated = number.trunc();
    let mut kind = (truncated != number).then_some(AdjustmentKind::Truncated);

    let page = if truncated < Decimal::ONE {
        kind = Some(AdjustmentKind::Clamped);
        1
    } else {
        match truncated.to_u32() {
            Some(page) => page,
            None => {
                kind = Some(AdjustmentKind::Clamped);
                u32::MAX
            }
        }
    };

    (page, kind.map(|kind| ParamAdjustment::new(Param::Page, kind, raw)))
}

/// Parses a minimum value. Accepts plain decimals and scientific notation.
///
/// Missing, unparseable or non-finite text (`NaN`, `inf`) falls back to
/// `default_threshold`; negative values clamp to 0.
#[must_use]
pub fn parse_threshold(
    raw: Option<&str>,
    default_threshold: Decimal,
) -> (Decimal, Option<ParamAdjustment>) {
    let Some(number) = raw.map(str::trim).filter(|t| !t.is_empty()).and_then(parse_decimal) else {
        return (
            default_threshold,
            Some(ParamAdjustment::new(Param::Threshold, AdjustmentKind::Defaulted, raw)),
        );
    };

    if number.is_sign_negative() && !number.is_zero() {
        return (
            Decimal::ZERO,
            Some(ParamAdjustment::new(Param::Threshold, AdjustmentKind::Clamped, raw)),
        );
    }

    (number, None)
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text).or_else(|_| Decimal::from_scientific(text)).ok()
}

/// `Some(true)` for `[+]digits`, `Some(false)` for `-digits`, `None` otherwise.
fn integer_sign(text: &str) -> Option<bool> {
    let (positive, digits) = match text.as_bytes().first()? {
        b'-' => (false, &text[1..]),
        b'+' => (true, &text[1..]),
        _ => (true, text),
    };
    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(positive)
}
