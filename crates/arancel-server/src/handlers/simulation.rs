//! `POST /simular`

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Json;
use serde_json::Value;

use arancel::SimulationInput;

use crate::state::AppState;
use crate::types::{ApiError, ApiResult, SimulationResponse};

/// Compute the landed cost of an import and record it in the history.
///
/// The body is read raw so that malformed JSON reports through the
/// simulation error shape instead of axum's rejection.
pub async fn simular(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<SimulationResponse>> {
    let value: Value =
        serde_json::from_slice(&body).map_err(|e| ApiError::Simulation(e.to_string()))?;
    if !value.is_object() {
        return Err(ApiError::Simulation("expected a JSON object".to_string()));
    }

    let input = SimulationInput::from_json(&value)?;
    let quote = state.simulator.simulate(&input)?;
    Ok(Json(SimulationResponse::from(&quote)))
}
