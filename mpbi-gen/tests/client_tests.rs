//! Polling client against a live service on an ephemeral port

mod helpers;

use helpers::*;
use mpbi_common::db::upsert_operator;
use mpbi_gen::client::{ClientError, PollingClient};
use mpbi_gen::models::{GenerationCriteria, GenerationMode};

const SECRET: i64 = 424_242;

/// Serve `app` on 127.0.0.1 and return its base URL
async fn spawn_server(app: &TestApp) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn all_statuses() -> GenerationCriteria {
    GenerationCriteria {
        statuses: Some(vec!["complete".to_string(), "refunded".to_string()]),
        ..GenerationCriteria::default()
    }
}

#[tokio::test]
async fn test_client_runs_to_completion_and_packages() {
    let db = memberpress_pool().await;
    seed_payments(&db, 23).await;
    upsert_operator(&db, "admin", true).await.unwrap();
    let app = test_app_with_secret(db, ScriptedRenderer::working(), SECRET);
    let base_url = spawn_server(&app).await;

    let client = PollingClient::new(base_url, "admin", SECRET);
    let report = client.run(&all_statuses(), true, |_| {}).await.unwrap();

    assert!(report.job_id.is_some());
    assert_eq!(report.total, 23);
    assert_eq!(report.processed, 23);
    assert_eq!(report.successful, 23);
    assert!(report.errors.is_empty());
    assert_eq!(report.message, "Successfully generated 23 invoices.");

    let archive = report.archive.expect("packaging was requested");
    assert_eq!(archive.file_count, 23);
    assert!(archive.zip_url.starts_with("/downloads/"));
    assert!(app.output_dir().join(&archive.zip_filename).is_file());
    assert!(!client.is_running());
}

#[tokio::test]
async fn test_client_reports_no_matches() {
    let db = memberpress_pool().await;
    let app = test_app(db, ScriptedRenderer::working());
    let base_url = spawn_server(&app).await;

    let client = PollingClient::new(base_url, "admin", 0);
    let report = client.run(&all_statuses(), false, |_| {}).await.unwrap();

    assert!(report.job_id.is_none());
    assert_eq!(report.message, "No transactions found matching the criteria.");
    assert!(report.archive.is_none());
}

#[tokio::test]
async fn test_client_validates_locally() {
    // No server: validation must fail before any request
    let client = PollingClient::new("http://127.0.0.1:9", "admin", 0);
    let criteria = GenerationCriteria {
        mode: GenerationMode::Period,
        start_date: Some("2024-05-01".to_string()),
        end_date: Some("2024-04-01".to_string()),
        ..GenerationCriteria::default()
    };

    let result = client.run(&criteria, false, |_| {}).await;

    assert!(matches!(result, Err(ClientError::Invalid(_))));
    assert!(!client.is_running());
}

#[tokio::test]
async fn test_client_refuses_second_run_in_flight() {
    let db = memberpress_pool().await;
    seed_payments(&db, 3).await;
    let app = test_app(db, ScriptedRenderer::working());
    let base_url = spawn_server(&app).await;

    let client = PollingClient::new(base_url, "admin", 0);
    let criteria = all_statuses();
    let (first, second) = tokio::join!(
        client.run(&criteria, false, |_| {}),
        client.run(&criteria, false, |_| {}),
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(ClientError::AlreadyRunning)));
}

#[tokio::test]
async fn test_client_surfaces_permission_failure() {
    let db = memberpress_pool().await;
    seed_payments(&db, 3).await;
    upsert_operator(&db, "viewer", false).await.unwrap();
    let app = test_app_with_secret(db, ScriptedRenderer::working(), SECRET);
    let base_url = spawn_server(&app).await;

    let client = PollingClient::new(base_url, "viewer", SECRET);
    let err = client.run(&all_statuses(), false, |_| {}).await.unwrap_err();

    assert_eq!(err.code(), Some("permission_denied"));
    assert!(!client.is_running());
}
