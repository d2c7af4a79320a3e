//! Likeness Infrastructure Library
//!
//! Shared infrastructure for the API binary:
//! - Telemetry initialization
//! - Request ID middleware
//! - The JSON error body

#[cfg(feature = "middleware")]
pub mod middleware;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

pub mod error;

#[cfg(feature = "middleware")]
pub use middleware::{get_request_id, request_id_middleware, RequestId, REQUEST_ID_HEADER};

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, LogFormat};

pub use error::ErrorResponse;
