//! Import cost simulation and the history it leaves behind.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RatePolicy;
use crate::storage::HistoryStore;
use crate::types::{ArancelError, ArancelResult, SimulationRecord};

/// Longest company name kept in the history.
pub const MAX_COMPANY_LEN: usize = 100;

/// Company recorded when the request names none.
pub const DEFAULT_COMPANY: &str = "Anonimo";

/// Number of records returned by the history listing.
pub const HISTORY_LIMIT: usize = 10;

/// `chrono` format of [`SimulationRecord::recorded_at`].
pub const HISTORY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Errors raised while running a simulation.
#[derive(thiserror::Error, Debug)]
pub enum SimulationError {
    #[error("could not convert {field} to a number: {value}")]
    Input { field: &'static str, value: String },

    #[error(transparent)]
    Storage(#[from] ArancelError),
}

/// Inputs of one simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationInput {
    pub company: String,
    pub declared_value: f64,
    pub freight: f64,
    /// Duty rate as a percentage, e.g. `10.0` for 10 %.
    pub duty_rate_percent: f64,
}

impl SimulationInput {
    /// Read the `{empresa, valor, flete, gravamen}` request body.
    ///
    /// Numbers, booleans and numeric strings are accepted; missing fields
    /// default to zero. The company name is truncated to [`MAX_COMPANY_LEN`].
    pub fn from_json(body: &Value) -> Result<Self, SimulationError> {
        let company = match body.get("empresa") {
            None => DEFAULT_COMPANY.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        Ok(Self {
            company: truncate_chars(&company, MAX_COMPANY_LEN),
            declared_value: coerce_number(body, "valor")?,
            freight: coerce_number(body, "flete")?,
            duty_rate_percent: coerce_number(body, "gravamen")?,
        })
    }
}

fn coerce_number(body: &Value, field: &'static str) -> Result<f64, SimulationError> {
    let invalid = |value: &Value| SimulationError::Input {
        field,
        value: value.to_string(),
    };
    match body.get(field) {
        None => Ok(0.0),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| invalid(&Value::Number(n.clone()))),
        Some(Value::Bool(b)) => Ok(if *b { 1.0 } else { 0.0 }),
        Some(v @ Value::String(s)) => s.trim().parse::<f64>().map_err(|_| invalid(v)),
        Some(other) => Err(invalid(other)),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Result of a simulation. Values are unrounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationQuote {
    pub cif: f64,
    pub duty: f64,
    pub vat: f64,
    pub total: f64,
}

impl SimulationQuote {
    /// The same quote rounded to cents for display.
    pub fn rounded(&self) -> Self {
        Self {
            cif: round2(self.cif),
            duty: round2(self.duty),
            vat: round2(self.vat),
            total: round2(self.total),
        }
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pure landed cost arithmetic with the given VAT percentage.
pub fn compute_quote(input: &SimulationInput, vat_rate_percent: f64) -> SimulationQuote {
    let cif = input.declared_value + input.freight;
    let duty = cif * (input.duty_rate_percent / 100.0);
    let vat = (cif + duty) * (vat_rate_percent / 100.0);
    SimulationQuote {
        cif,
        duty,
        vat,
        total: cif + duty + vat,
    }
}

/// Runs simulations and keeps their history.
#[derive(Clone)]
pub struct CostSimulator {
    history: Arc<dyn HistoryStore>,
    vat_rate: f64,
}

impl CostSimulator {
    pub fn new(history: Arc<dyn HistoryStore>) -> Self {
        Self {
            history,
            vat_rate: RatePolicy::default().vat_rate,
        }
    }

    /// Apply the VAT rate of `policy`.
    pub fn with_policy(mut self, policy: &RatePolicy) -> Self {
        self.vat_rate = policy.vat_rate;
        self
    }

    /// Compute a quote and append it to the history.
    pub fn simulate(&self, input: &SimulationInput) -> Result<SimulationQuote, SimulationError> {
        let quote = compute_quote(input, self.vat_rate);
        let record = SimulationRecord {
            company: truncate_chars(&input.company, MAX_COMPANY_LEN),
            recorded_at: chrono::Local::now().format(HISTORY_DATE_FORMAT).to_string(),
            total_cost: quote.total,
        };
        self.history.append(&record)?;
        tracing::debug!("simulation for {:?}: total {:.2}", record.company, quote.total);
        Ok(quote)
    }

    /// The most recent simulations, newest first.
    pub fn recent(&self) -> ArancelResult<Vec<SimulationRecord>> {
        self.history.recent(HISTORY_LIMIT)
    }

    /// Like [`recent`](Self::recent) with a caller-chosen limit.
    pub fn recent_limited(&self, limit: usize) -> ArancelResult<Vec<SimulationRecord>> {
        self.history.recent(limit)
    }
}
