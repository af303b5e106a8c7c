//! HTTP API handlers for mpbi-gen

pub mod auth;
pub mod error;
pub mod files;
pub mod generation;
pub mod health;
pub mod sse;
pub mod stats;
pub mod ui;

pub use auth::auth_middleware;
pub use error::{ApiError, ApiResult};
pub use files::{create_archive, delete_files, download_all, download_archive, file_stats};
pub use generation::{advance_generation, generation_progress, start_generation};
pub use health::health_routes;
pub use sse::generation_event_stream;
pub use stats::get_transaction_stats;
pub use ui::{serve_app_js, serve_index};
