//! Rate resolver — cache first, live portal retrieval on a miss.

use std::sync::Arc;

use crate::cache::RateCache;
use crate::portal::{RateRetriever, RetrievalError};
use crate::types::{ArancelError, ClassificationCode, InvalidCode, RateRecord, ResolvedRate};

/// Why a rate could not be resolved.
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    InvalidCode(#[from] InvalidCode),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Rate cache unavailable: {0}")]
    Storage(#[from] ArancelError),
}

/// Orchestrates the rate cache and the live retriever.
///
/// Concurrent resolutions of the same uncached code each run their own
/// retrieval; the last one to finish owns the cache entry.
#[derive(Clone)]
pub struct RateResolver {
    cache: RateCache,
    retriever: Arc<dyn RateRetriever>,
}

impl RateResolver {
    pub fn new(cache: RateCache, retriever: Arc<dyn RateRetriever>) -> Self {
        Self { cache, retriever }
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    /// Resolve the duty and VAT rates for a raw classification code.
    pub async fn resolve(&self, raw_code: &str) -> Result<ResolvedRate, ResolveError> {
        let code = ClassificationCode::parse(raw_code)?;

        if let Some(record) = self.cache.get(&code)? {
            tracing::debug!("[{code}] served from cache");
            return Ok(ResolvedRate {
                record,
                from_cache: true,
            });
        }

        let rates = self.retriever.retrieve(&code).await?;

        let record = match self.cache.put(&code, rates.duty_rate, rates.vat_rate) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("[{code}] failed to cache live rate: {e}");
                RateRecord {
                    code,
                    duty_rate: rates.duty_rate,
                    vat_rate: rates.vat_rate,
                    resolved_at: chrono::Utc::now(),
                }
            }
        };

        Ok(ResolvedRate {
            record,
            from_cache: false,
        })
    }
}
