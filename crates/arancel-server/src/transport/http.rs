//! HTTP transport — axum router with CORS and /health.

use axum::http::{header, HeaderValue, Method};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::handlers::{history, rates, simulation};
use crate::state::AppState;

/// Build the API router.
pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/consultar-arancel", get(rates::consultar_arancel))
        .route("/simular", post(simulation::simular))
        .route("/historial", get(history::historial))
        .route("/limpiar-cache", post(history::limpiar_cache))
        .route("/health", get(handle_health))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// CORS for the listed origins, GET and POST with a `Content-Type` header.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Serves the API until ctrl-c.
pub struct HttpTransport {
    state: AppState,
    cors_origins: Vec<String>,
}

impl HttpTransport {
    pub fn new(state: AppState, cors_origins: Vec<String>) -> Self {
        Self {
            state,
            cors_origins,
        }
    }

    /// Run the HTTP server on the given address.
    pub async fn run(&self, addr: &str) -> anyhow::Result<()> {
        let app = router(self.state.clone(), &self.cors_origins);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP API listening on {addr}");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP API stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
