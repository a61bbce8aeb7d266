//! JSON bodies returned by the API.

use serde::{Deserialize, Serialize};

use arancel::{ResolvedRate, SimulationQuote, SimulationRecord};

/// `GET /consultar-arancel`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateResponse {
    pub gravamen: f64,
    pub iva: f64,
    pub desde_cache: bool,
    pub success: bool,
}

impl From<&ResolvedRate> for RateResponse {
    fn from(rate: &ResolvedRate) -> Self {
        Self {
            gravamen: rate.duty_rate(),
            iva: rate.vat_rate(),
            desde_cache: rate.from_cache,
            success: true,
        }
    }
}

/// `POST /simular`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResponse {
    pub costo_total: f64,
    pub arancel_calculado: f64,
    pub iva_calculado: f64,
    pub cif: f64,
    pub success: bool,
}

impl From<&SimulationQuote> for SimulationResponse {
    fn from(quote: &SimulationQuote) -> Self {
        let rounded = quote.rounded();
        Self {
            costo_total: rounded.total,
            arancel_calculado: rounded.duty,
            iva_calculado: rounded.vat,
            cif: rounded.cif,
            success: true,
        }
    }
}

/// One row of `GET /historial`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub empresa: String,
    pub fecha: String,
    pub costo_total: f64,
}

impl From<SimulationRecord> for HistoryEntry {
    fn from(record: SimulationRecord) -> Self {
        Self {
            empresa: record.company,
            fecha: record.recorded_at,
            costo_total: record.total_cost,
        }
    }
}

/// `POST /limpiar-cache`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheClearedResponse {
    pub mensaje: String,
    pub success: bool,
}

impl Default for CacheClearedResponse {
    fn default() -> Self {
        Self {
            mensaje: "Cache limpiado".to_string(),
            success: true,
        }
    }
}
