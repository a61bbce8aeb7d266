//! Arancel HTTP API — tariff rate lookup, import cost simulation and
//! simulation history over JSON.

pub mod config;
pub mod handlers;
pub mod state;
pub mod transport;
pub mod types;

pub use config::ServerConfig;
pub use state::AppState;
pub use transport::{router, HttpTransport};
