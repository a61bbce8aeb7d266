//! Request handlers, one module per resource.

pub mod history;
pub mod rates;
pub mod simulation;
