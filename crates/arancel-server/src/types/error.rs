//! API error type and its JSON rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use arancel::{ArancelError, ResolveError, SimulationError};

/// Message returned for a malformed classification code.
pub const INVALID_CODE_MESSAGE: &str = "Partida inválida";

/// Message returned for every live retrieval failure.
pub const SOURCE_UNAVAILABLE_MESSAGE: &str = "No se pudo consultar la DIAN.";

/// All errors an endpoint can return.
///
/// Every variant renders as `{"error": ..., "success": false}`.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{INVALID_CODE_MESSAGE}")]
    InvalidCode,

    #[error("{SOURCE_UNAVAILABLE_MESSAGE}")]
    SourceUnavailable,

    #[error("Error en simulación: {0}")]
    Simulation(String),

    #[error("Error de almacenamiento: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidCode => StatusCode::BAD_REQUEST,
            // Retrieval failures are reported in-band.
            ApiError::SourceUnavailable => StatusCode::OK,
            ApiError::Simulation(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
            "success": false,
        });
        (self.status(), Json(body)).into_response()
    }
}

impl From<ResolveError> for ApiError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::InvalidCode(_) => ApiError::InvalidCode,
            ResolveError::Retrieval(_) => ApiError::SourceUnavailable,
            ResolveError::Storage(e) => ApiError::Storage(e.to_string()),
        }
    }
}

impl From<SimulationError> for ApiError {
    fn from(e: SimulationError) -> Self {
        ApiError::Simulation(e.to_string())
    }
}

impl From<ArancelError> for ApiError {
    fn from(e: ArancelError) -> Self {
        ApiError::Storage(e.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
