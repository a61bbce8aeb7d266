//! Shared application state handed to every request handler.

use std::sync::Arc;

use arancel::{
    find_chromium, BrowserLauncher, BrowserOptions, ChromiumLauncher, CostSimulator,
    NoopLauncher, PortalClient, PortalConfig, RateCache, RatePolicy, RateResolver,
    RateRetriever, SqliteStore, StepTimeouts,
};

use crate::config::ServerConfig;

/// Resolver and simulator shared by all handlers via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub resolver: RateResolver,
    pub simulator: CostSimulator,
}

impl AppState {
    pub fn new(resolver: RateResolver, simulator: CostSimulator) -> Self {
        Self {
            resolver,
            simulator,
        }
    }

    /// Wire the SQLite store, the rate cache and the portal client.
    ///
    /// Without a Chromium binary the server still starts; every live
    /// retrieval then fails with a launch error.
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.db_path)?);
        let policy = RatePolicy::default();

        let retriever: Arc<dyn RateRetriever> = Arc::new(PortalClient::new(
            launcher_for(config),
            PortalConfig::from_policy(&policy)
                .with_timeouts(StepTimeouts::uniform(config.portal_timeout)),
        ));

        let resolver = RateResolver::new(RateCache::with_policy(store.clone(), &policy), retriever);
        let simulator = CostSimulator::new(store).with_policy(&policy);
        Ok(Self::new(resolver, simulator))
    }
}

fn launcher_for(config: &ServerConfig) -> Arc<dyn BrowserLauncher> {
    match find_chromium(config.chromium_path.as_ref()) {
        Some(path) => {
            tracing::info!("Browser: {}", path.display());
            Arc::new(ChromiumLauncher::new(BrowserOptions {
                executable: Some(path),
                request_timeout: config.portal_timeout,
                ..BrowserOptions::default()
            }))
        }
        None => {
            tracing::warn!("No Chromium binary found; live rate lookups will fail");
            Arc::new(NoopLauncher)
        }
    }
}
