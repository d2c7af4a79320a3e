//! Likeness API Library
//!
//! HTTP handlers, application state and setup for the identity-generation dashboard backend.

mod api_doc;
pub mod handlers;
pub mod ndjson;
pub mod setup;

pub mod error;
pub mod state;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
