//! Rate cache — freshness rules on top of a [`RateStore`].
//!
//! ## Freshness
//!
//! A record is served while `now - resolved_at <= ttl`. Older records stay in
//! the store until the next write or a bulk clear, but are never returned.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::RatePolicy;
use crate::storage::RateStore;
use crate::types::{ArancelResult, ClassificationCode, RateRecord};

/// Cache of resolved rates keyed by classification code.
#[derive(Clone)]
pub struct RateCache {
    store: Arc<dyn RateStore>,
    ttl: chrono::Duration,
}

impl RateCache {
    pub fn new(store: Arc<dyn RateStore>, ttl: chrono::Duration) -> Self {
        Self { store, ttl }
    }

    pub fn with_policy(store: Arc<dyn RateStore>, policy: &RatePolicy) -> Self {
        Self::new(store, policy.cache_ttl)
    }

    /// Get the cached record for `code` if it is still fresh.
    pub fn get(&self, code: &ClassificationCode) -> ArancelResult<Option<RateRecord>> {
        self.get_at(code, Utc::now())
    }

    /// Same as [`get`](Self::get), judged against an explicit clock.
    pub fn get_at(
        &self,
        code: &ClassificationCode,
        now: DateTime<Utc>,
    ) -> ArancelResult<Option<RateRecord>> {
        let Some(record) = self.store.load(code)? else {
            return Ok(None);
        };

        if now.signed_duration_since(record.resolved_at) > self.ttl {
            tracing::debug!("cached rate for {code} is stale (resolved {})", record.resolved_at);
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Store a freshly resolved rate, replacing any previous entry.
    pub fn put(
        &self,
        code: &ClassificationCode,
        duty_rate: f64,
        vat_rate: f64,
    ) -> ArancelResult<RateRecord> {
        let record = RateRecord {
            code: code.clone(),
            duty_rate,
            vat_rate,
            resolved_at: Utc::now(),
        };
        self.store.upsert(&record)?;
        Ok(record)
    }

    /// Remove every cached rate.
    pub fn clear(&self) -> ArancelResult<usize> {
        let removed = self.store.clear()?;
        tracing::info!("rate cache cleared ({removed} entries)");
        Ok(removed)
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }
}
