//! Shared HTTP API functionality
//!
//! Authentication primitives and wire types used by both the service
//! (axum middleware) and its clients.
//!
//! This module contains ONLY:
//! - Pure functions (no HTTP framework dependencies)
//! - Database operations (via sqlx)
//! - Shared types

pub mod auth;
pub mod types;

pub use auth::{
    calculate_hash, now_millis, sign_request, validate_hash, validate_timestamp, ApiAuthError,
};
#[cfg(feature = "sqlx")]
pub use auth::{check_operator, initialize_shared_secret, load_shared_secret};
pub use types::{AuthFields, ErrorBody, ErrorDetail};
