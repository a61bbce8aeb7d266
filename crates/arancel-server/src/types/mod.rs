//! Response bodies and errors used by the HTTP API.

pub mod error;
pub mod response;

pub use error::*;
pub use response::*;
