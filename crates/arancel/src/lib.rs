//! Arancel — tariff rate resolution against the DIAN portal, with a rate
//! cache and import cost simulation.

pub mod browser;
pub mod cache;
pub mod config;
pub mod portal;
pub mod resolver;
pub mod simulator;
pub mod storage;
pub mod types;

pub use browser::chromium::{find_chromium, ChromiumLauncher};
pub use browser::{BrowserLauncher, BrowserSession, Locator, NoopLauncher};
pub use cache::RateCache;
pub use config::{BrowserOptions, PortalConfig, RatePolicy, StepTimeouts, FIXED_VAT_RATE};
pub use portal::{PortalClient, RateRetriever, RetrievalError, RetrievalStage};
pub use resolver::{RateResolver, ResolveError};
pub use simulator::{CostSimulator, SimulationError, SimulationInput, SimulationQuote};
pub use storage::{HistoryStore, MemoryStore, RateStore, SqliteStore};
pub use types::*;
