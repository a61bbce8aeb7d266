//! Configuration loading and resolution.
//!
//! Every setting resolves in the same order: explicit CLI flag, then
//! environment variable, then the built-in default.

use std::path::PathBuf;
use std::time::Duration;

/// SQLite database file used when nothing else is configured.
pub const DEFAULT_DB_PATH: &str = "database.db";

/// Listen address used when nothing else is configured.
pub const DEFAULT_ADDR: &str = "127.0.0.1:5000";

/// Front-end origins allowed to call the API.
pub const DEFAULT_CORS_ORIGINS: [&str; 3] = [
    "http://localhost:3000",
    "http://127.0.0.1:5000",
    "http://localhost:5500",
];

/// Per-step portal timeout, in seconds.
pub const DEFAULT_PORTAL_TIMEOUT_SECS: u64 = 30;

/// Resolved server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: String,
    pub addr: String,
    pub cors_origins: Vec<String>,
    pub portal_timeout: Duration,
    pub chromium_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Resolve every setting from flags and the process environment.
    pub fn resolve(
        db: Option<&str>,
        addr: Option<&str>,
        cors_origins: &[String],
        portal_timeout_secs: Option<u64>,
    ) -> Self {
        Self {
            db_path: resolve_db_path(db),
            addr: first_of(addr, env("ARANCEL_ADDR"), DEFAULT_ADDR),
            cors_origins: resolve_cors_origins(cors_origins, env("ARANCEL_CORS_ORIGINS")),
            portal_timeout: resolve_portal_timeout(
                portal_timeout_secs,
                env("ARANCEL_PORTAL_TIMEOUT_SECS"),
            ),
            chromium_path: env("ARANCEL_CHROMIUM_PATH").map(PathBuf::from),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            addr: DEFAULT_ADDR.to_string(),
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
            portal_timeout: Duration::from_secs(DEFAULT_PORTAL_TIMEOUT_SECS),
            chromium_path: None,
        }
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn first_of(explicit: Option<&str>, from_env: Option<String>, default: &str) -> String {
    explicit
        .map(str::to_string)
        .or(from_env)
        .unwrap_or_else(|| default.to_string())
}

/// Resolve the database path.
pub fn resolve_db_path(explicit: Option<&str>) -> String {
    first_of(explicit, env("ARANCEL_DB"), DEFAULT_DB_PATH)
}

/// Resolve the CORS origin list. A comma separated env value replaces the defaults.
pub fn resolve_cors_origins(explicit: &[String], from_env: Option<String>) -> Vec<String> {
    if !explicit.is_empty() {
        return explicit.to_vec();
    }
    if let Some(list) = from_env {
        let origins: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !origins.is_empty() {
            return origins;
        }
    }
    DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect()
}

/// Resolve the per-step portal timeout. Unparseable or zero env values are ignored.
pub fn resolve_portal_timeout(explicit: Option<u64>, from_env: Option<String>) -> Duration {
    let secs = explicit
        .or_else(|| from_env.and_then(|v| v.trim().parse::<u64>().ok()))
        .filter(|s| *s > 0)
        .unwrap_or(DEFAULT_PORTAL_TIMEOUT_SECS);
    Duration::from_secs(secs)
}
