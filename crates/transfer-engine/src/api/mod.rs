//! # Transfer API
//!
//! Request/response layer for the upload, payment and download endpoints.
//! HTTP routing is left to the host; bodies are plain serde types.

mod handler;
pub mod types;

pub use handler::{handle_api_query, ApiQueryError, TransferApiHandler};
pub use types::*;
