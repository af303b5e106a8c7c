//! Shared fixtures for mpbi-gen integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use mpbi_common::config::ServiceConfig;
use mpbi_common::db::create_service_tables;
use mpbi_gen::models::Transaction;
use mpbi_gen::services::{InvoiceRenderer, RenderError};
use mpbi_gen::{build_router, AppState};
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

// =============================================================================
// Database
// =============================================================================

/// In-memory database with the service tables and `wp_` MemberPress tables
pub async fn memberpress_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Should open in-memory database");
    create_service_tables(&pool)
        .await
        .expect("Should create service tables");

    sqlx::query(
        r#"
        CREATE TABLE wp_mepr_transactions (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            product_id INTEGER NOT NULL,
            amount TEXT NOT NULL DEFAULT '0.00',
            total TEXT NOT NULL DEFAULT '0.00',
            status TEXT NOT NULL,
            txn_type TEXT NOT NULL,
            trans_num TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("Should create transactions table");
    sqlx::query("CREATE TABLE wp_users (ID INTEGER PRIMARY KEY, user_email TEXT NOT NULL)")
        .execute(&pool)
        .await
        .expect("Should create users table");

    pool
}

pub async fn insert_payment(pool: &SqlitePool, id: i64, status: &str, created_at: &str) {
    sqlx::query(
        r#"
        INSERT INTO wp_mepr_transactions
            (id, user_id, product_id, amount, total, status, txn_type, trans_num, created_at)
        VALUES (?, 1, 1, '25.00', '25.00', ?, 'payment', ?, ?)
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(format!("mp-txn-{}", id))
    .bind(created_at)
    .execute(pool)
    .await
    .expect("Should insert transaction");
}

/// `count` payments with ids `1..=count`, alternating complete and refunded
pub async fn seed_payments(pool: &SqlitePool, count: i64) {
    for id in 1..=count {
        let status = if id % 2 == 0 { "refunded" } else { "complete" };
        insert_payment(pool, id, status, &format!("2024-03-{:02} 12:00:00", (id % 28) + 1)).await;
    }
}

// =============================================================================
// Renderer
// =============================================================================

/// Renderer writing a stub PDF per transaction, failing for chosen ids
pub struct ScriptedRenderer {
    pub available: bool,
    pub fail_ids: HashSet<i64>,
}

impl ScriptedRenderer {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            available: true,
            fail_ids: HashSet::new(),
        })
    }

    pub fn failing_on(ids: &[i64]) -> Arc<Self> {
        Arc::new(Self {
            available: true,
            fail_ids: ids.iter().copied().collect(),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            available: false,
            fail_ids: HashSet::new(),
        })
    }
}

#[async_trait]
impl InvoiceRenderer for ScriptedRenderer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn render(
        &self,
        txn: &Transaction,
        output_dir: &Path,
    ) -> Result<Option<PathBuf>, RenderError> {
        if self.fail_ids.contains(&txn.id) {
            return Err(RenderError::Failed("template exploded".to_string()));
        }
        let path = output_dir.join(format!("invoice-{}.pdf", txn.trans_num));
        tokio::fs::write(&path, b"%PDF-1.4 stub").await?;
        Ok(Some(path))
    }
}

// =============================================================================
// App
// =============================================================================

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub root: TempDir,
}

impl TestApp {
    pub fn output_dir(&self) -> PathBuf {
        self.state.config.output_dir.clone()
    }
}

/// App with authentication disabled (shared secret 0)
pub fn test_app(db: SqlitePool, renderer: Arc<dyn InvoiceRenderer>) -> TestApp {
    test_app_with_secret(db, renderer, 0)
}

pub fn test_app_with_secret(
    db: SqlitePool,
    renderer: Arc<dyn InvoiceRenderer>,
    shared_secret: i64,
) -> TestApp {
    let root = TempDir::new().expect("Should create temp dir");
    let config = ServiceConfig::with_root(root.path());
    let state = AppState::new(db, config, renderer, shared_secret);
    TestApp {
        router: build_router(state.clone()),
        state,
        root,
    }
}

// =============================================================================
// Requests
// =============================================================================

pub fn json_request(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

pub async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(router, json_request(uri, &body)).await
}
