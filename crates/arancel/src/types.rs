//! Core data types for classification codes, cached rates, and simulations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tariff classification code ("partida").
///
/// Always non-empty and made only of ASCII digits. Surrounding whitespace is
/// trimmed before validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClassificationCode(String);

impl ClassificationCode {
    /// Validate and wrap a raw code.
    pub fn parse(raw: &str) -> Result<Self, InvalidCode> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidCode(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClassificationCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClassificationCode {
    type Error = InvalidCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ClassificationCode> for String {
    fn from(code: ClassificationCode) -> Self {
        code.0
    }
}

/// Rejected classification code input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid classification code: {0:?}")]
pub struct InvalidCode(pub String);

/// A duty/VAT rate pair resolved for one classification code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub code: ClassificationCode,
    /// Import duty, as a percentage.
    pub duty_rate: f64,
    /// VAT, as a percentage.
    pub vat_rate: f64,
    pub resolved_at: DateTime<Utc>,
}

/// A rate returned by the resolver, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRate {
    #[serde(flatten)]
    pub record: RateRecord,
    pub from_cache: bool,
}

impl ResolvedRate {
    pub fn duty_rate(&self) -> f64 {
        self.record.duty_rate
    }

    pub fn vat_rate(&self) -> f64 {
        self.record.vat_rate
    }
}

/// Rates extracted live from the portal, before they are cached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortalRates {
    pub duty_rate: f64,
    pub vat_rate: f64,
}

/// One entry of the simulation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub company: String,
    /// Local time formatted with [`HISTORY_DATE_FORMAT`](crate::simulator::HISTORY_DATE_FORMAT).
    pub recorded_at: String,
    pub total_cost: f64,
}

/// Errors raised by the storage layer.
#[derive(thiserror::Error, Debug)]
pub enum ArancelError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Convenience result type.
pub type ArancelResult<T> = Result<T, ArancelError>;
