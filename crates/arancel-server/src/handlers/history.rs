//! `GET /historial` and `POST /limpiar-cache`

use axum::extract::State;
use axum::response::Json;

use crate::state::AppState;
use crate::types::{ApiResult, CacheClearedResponse, HistoryEntry};

/// The ten most recent simulations, newest first.
pub async fn historial(State(state): State<AppState>) -> ApiResult<Json<Vec<HistoryEntry>>> {
    let records = state.simulator.recent()?;
    Ok(Json(records.into_iter().map(HistoryEntry::from).collect()))
}

/// Drop every cached rate.
pub async fn limpiar_cache(State(state): State<AppState>) -> ApiResult<Json<CacheClearedResponse>> {
    state.resolver.cache().clear()?;
    Ok(Json(CacheClearedResponse::default()))
}
