//! mpbi-gen library - MemberPress bulk invoice generation service
//!
//! Generates PDF invoices for MemberPress transactions in client-driven
//! batches and packages them into downloadable ZIP archives.

use axum::Router;
use mpbi_common::config::ServiceConfig;
use mpbi_common::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod client;
pub mod db;
pub mod models;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

use services::{BatchExecutor, InvoiceRenderer};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Service database (jobs, settings, operators) and MemberPress tables
    pub db: SqlitePool,
    pub config: Arc<ServiceConfig>,
    pub renderer: Arc<dyn InvoiceRenderer>,
    /// Event bus feeding the SSE stream
    pub event_bus: EventBus,
    /// Shared secret for API authentication (0 disables auth)
    pub shared_secret: i64,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        config: ServiceConfig,
        renderer: Arc<dyn InvoiceRenderer>,
        shared_secret: i64,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            renderer,
            event_bus: EventBus::new(100),
            shared_secret,
        }
    }

    pub fn executor(&self) -> BatchExecutor {
        BatchExecutor::new(
            self.db.clone(),
            self.config.clone(),
            self.renderer.clone(),
            self.event_bus.clone(),
        )
    }
}

/// Build application router
///
/// `/health`, `/` and `/static/app.js` are public; everything else requires
/// authentication.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/api/generation/start", post(api::start_generation))
        .route("/api/generation/advance", post(api::advance_generation))
        .route("/api/generation/progress", post(api::generation_progress))
        .route("/api/generation/events", get(api::generation_event_stream))
        .route("/api/files/archive", post(api::create_archive))
        .route("/api/files/download-all", post(api::download_all))
        .route("/api/files/stats", post(api::file_stats))
        .route("/api/files/delete", post(api::delete_files))
        .route("/api/transactions/stats", post(api::get_transaction_stats))
        .route("/downloads/:filename", get(api::download_archive))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/", get(api::serve_index))
        .route("/static/app.js", get(api::serve_app_js))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
