//! Authentication and privilege tests
//!
//! Every `/api` and `/downloads` route requires a valid timestamp + hash and
//! an operator holding the manage capability. Failures are uniform.

mod helpers;

use axum::http::StatusCode;
use helpers::*;
use mpbi_common::api::{calculate_hash, now_millis, sign_request};
use mpbi_common::db::upsert_operator;
use serde_json::{json, Value};

const SECRET: i64 = 7_355_608;

async fn secured_app() -> TestApp {
    let db = memberpress_pool().await;
    seed_payments(&db, 3).await;
    upsert_operator(&db, "admin", true).await.unwrap();
    upsert_operator(&db, "viewer", false).await.unwrap();
    test_app_with_secret(db, ScriptedRenderer::working(), SECRET)
}

fn signed_query(operator: &str, secret: i64) -> String {
    let timestamp = now_millis();
    let hash = calculate_hash(
        &json!({ "timestamp": timestamp, "operator": operator, "hash": "" }),
        secret,
    );
    format!("timestamp={}&operator={}&hash={}", timestamp, operator, hash)
}

fn assert_uniform(body: &Value, code: &str) {
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], code);
}

// =============================================================================
// Authenticity token
// =============================================================================

#[tokio::test]
async fn test_signed_request_accepted() {
    let app = secured_app().await;

    let body = sign_request(json!({}), "admin", SECRET);
    let (status, body) = post(&app.router, "/api/transactions/stats", body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_signed_start_and_advance() {
    let app = secured_app().await;

    let start = sign_request(json!({ "statuses": ["complete", "refunded"] }), "admin", SECRET);
    let (status, body) = post(&app.router, "/api/generation/start", start).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let advance = sign_request(json!({ "job_id": job_id }), "admin", SECRET);
    let (status, body) = post(&app.router, "/api/generation/advance", advance).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["complete"], true);
}

#[tokio::test]
async fn test_bad_hash_rejected() {
    let app = secured_app().await;

    let body = sign_request(json!({}), "admin", SECRET + 1);
    let (status, body) = post(&app.router, "/api/transactions/stats", body).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_uniform(&body, "security_check_failed");
    assert_eq!(body["error"]["message"], "Security check failed.");
}

#[tokio::test]
async fn test_tampered_body_rejected() {
    let app = secured_app().await;

    let mut body = sign_request(json!({ "statuses": ["complete"] }), "admin", SECRET);
    body["statuses"] = json!(["refunded"]);
    let (status, body) = post(&app.router, "/api/generation/start", body).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_uniform(&body, "security_check_failed");
}

#[tokio::test]
async fn test_expired_timestamp_rejected() {
    let app = secured_app().await;

    let mut body = json!({ "timestamp": now_millis() - 120_000, "operator": "admin", "hash": "" });
    body["hash"] = json!(calculate_hash(&body, SECRET));
    let (status, body) = post(&app.router, "/api/files/stats", body).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_uniform(&body, "security_check_failed");
}

#[tokio::test]
async fn test_missing_auth_fields_rejected() {
    let app = secured_app().await;

    let (status, body) = post(&app.router, "/api/files/stats", json!({})).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_uniform(&body, "security_check_failed");
}

// =============================================================================
// Privilege
// =============================================================================

#[tokio::test]
async fn test_operator_without_capability_denied() {
    let app = secured_app().await;

    let body = sign_request(json!({}), "viewer", SECRET);
    let (status, body) = post(&app.router, "/api/files/delete", body).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_uniform(&body, "permission_denied");
    assert_eq!(
        body["error"]["message"],
        "You do not have permission to perform this action."
    );
}

#[tokio::test]
async fn test_unknown_operator_denied() {
    let app = secured_app().await;

    let body = sign_request(json!({}), "mallory", SECRET);
    let (status, body) = post(&app.router, "/api/transactions/stats", body).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_uniform(&body, "permission_denied");
}

// =============================================================================
// GET routes (query auth)
// =============================================================================

#[tokio::test]
async fn test_download_requires_query_auth() {
    let app = secured_app().await;
    std::fs::create_dir_all(app.output_dir()).unwrap();
    std::fs::write(app.output_dir().join("memberpress-invoices-x.zip"), b"PK").unwrap();

    let (status, _) = send(
        &app.router,
        get_request("/downloads/memberpress-invoices-x.zip"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let uri = format!(
        "/downloads/memberpress-invoices-x.zip?{}",
        signed_query("admin", SECRET)
    );
    let response = tower::util::ServiceExt::oneshot(app.router.clone(), get_request(&uri))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let uri = format!(
        "/downloads/memberpress-invoices-x.zip?{}",
        signed_query("viewer", SECRET)
    );
    let (status, body) = send(&app.router, get_request(&uri)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_uniform(&body, "permission_denied");
}

#[tokio::test]
async fn test_archive_link_must_be_signed_when_followed() {
    let app = secured_app().await;
    std::fs::create_dir_all(app.output_dir()).unwrap();
    std::fs::write(app.output_dir().join("invoice-1.pdf"), b"%PDF").unwrap();

    let (status, body) = post(
        &app.router,
        "/api/files/archive",
        sign_request(json!({}), "admin", SECRET),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let zip_url = body["zip_url"].as_str().unwrap().to_string();

    // Query signed at packaging time, followed after the window has passed
    let signed_at = now_millis() - 60_000;
    let hash = calculate_hash(
        &json!({ "timestamp": signed_at, "operator": "admin", "hash": "" }),
        SECRET,
    );
    let stale = format!("{}?timestamp={}&operator=admin&hash={}", zip_url, signed_at, hash);
    let (status, body) = send(&app.router, get_request(&stale)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_uniform(&body, "security_check_failed");

    let fresh = format!("{}?{}", zip_url, signed_query("admin", SECRET));
    let response = tower::util::ServiceExt::oneshot(app.router.clone(), get_request(&fresh))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_event_stream_rejects_bad_signature() {
    let app = secured_app().await;

    let uri = format!("/api/generation/events?{}", signed_query("admin", SECRET - 1));
    let (status, body) = send(&app.router, get_request(&uri)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_uniform(&body, "security_check_failed");
}

// =============================================================================
// Disabled authentication
// =============================================================================

#[tokio::test]
async fn test_zero_secret_disables_all_checks() {
    let db = memberpress_pool().await;
    let app = test_app(db, ScriptedRenderer::working());

    let (status, _) = post(&app.router, "/api/transactions/stats", json!({})).await;
    assert_eq!(status, StatusCode::OK);
}
