//! `GET /consultar-arancel`

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::Json;
use serde::Deserialize;

use crate::state::AppState;
use crate::types::{ApiError, ApiResult, RateResponse};

#[derive(Debug, Deserialize)]
pub struct RateQuery {
    #[serde(default)]
    pub partida: String,
}

/// Resolve duty and VAT rates for one classification code.
///
/// A query string that cannot be read is reported as an invalid code.
pub async fn consultar_arancel(
    State(state): State<AppState>,
    query: Result<Query<RateQuery>, QueryRejection>,
) -> ApiResult<Json<RateResponse>> {
    let Query(query) = query.map_err(|e| {
        tracing::debug!("rejected rate query: {e}");
        ApiError::InvalidCode
    })?;
    let rate = state.resolver.resolve(&query.partida).await?;
    Ok(Json(RateResponse::from(&rate)))
}
