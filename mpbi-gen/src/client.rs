//! Polling client for the generation API
//!
//! Drives a run the same way the browser page does: one start request,
//! strictly sequential advance requests until completion, and an
//! independent progress poll reporting snapshots through a callback.

use mpbi_common::api::{sign_request, ErrorBody};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{CriteriaError, GenerationCriteria, ProgressSnapshot};

/// Pause between consecutive advance requests
const ADVANCE_PAUSE_MS: u64 = 100;
/// Interval of the independent progress poll
const PROGRESS_POLL_MS: u64 = 2000;

/// Polling client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Processing already in progress. Please wait...")]
    AlreadyRunning,

    #[error("{0}")]
    Invalid(#[from] CriteriaError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
}

impl ClientError {
    /// Machine-readable code for API failures
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    job_id: Option<Uuid>,
    #[serde(default)]
    total: usize,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AdvanceResponse {
    complete: bool,
    #[serde(default)]
    processed: usize,
    #[serde(default)]
    successful: usize,
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    remaining: usize,
    message: Option<String>,
    #[serde(default)]
    packaging_requested: bool,
}

/// Archive link returned by the packaging endpoint
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ArchiveLink {
    pub zip_url: String,
    pub zip_filename: String,
    #[serde(default)]
    pub file_count: usize,
}

/// Outcome of a completed run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// `None` when no transaction matched
    pub job_id: Option<Uuid>,
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub errors: Vec<String>,
    pub message: String,
    pub archive: Option<ArchiveLink>,
}

/// Clears the in-flight flag when the run ends, however it ends
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// HTTP polling client
#[derive(Clone)]
pub struct PollingClient {
    http: reqwest::Client,
    base_url: String,
    operator: String,
    shared_secret: i64,
    in_flight: Arc<AtomicBool>,
}

impl PollingClient {
    pub fn new(base_url: impl Into<String>, operator: impl Into<String>, shared_secret: i64) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            operator: operator.into(),
            shared_secret,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run a generation to completion
    ///
    /// `on_progress` receives every snapshot from the 2 s progress poll.
    pub async fn run<F>(
        &self,
        criteria: &GenerationCriteria,
        create_zip: bool,
        on_progress: F,
    ) -> Result<RunReport, ClientError>
    where
        F: Fn(ProgressSnapshot) + Send + Sync + 'static,
    {
        criteria.validate()?;

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ClientError::AlreadyRunning);
        }
        let _guard = InFlightGuard(self.in_flight.clone());

        let mut body = serde_json::to_value(criteria).unwrap_or_else(|_| json!({}));
        if let Some(obj) = body.as_object_mut() {
            obj.insert("create_zip".to_string(), Value::Bool(create_zip));
        }
        let start: StartResponse = self.post("/api/generation/start", body).await?;
        info!("{}", start.message);

        let Some(job_id) = start.job_id else {
            return Ok(RunReport {
                message: start.message,
                ..RunReport::default()
            });
        };

        let poller = self.spawn_progress_poll(job_id, on_progress);
        let result = self.advance_until_complete(job_id, start.total).await;
        poller.abort();

        result
    }

    async fn advance_until_complete(&self, job_id: Uuid, total: usize) -> Result<RunReport, ClientError> {
        loop {
            let step: AdvanceResponse = self
                .post("/api/generation/advance", json!({ "job_id": job_id }))
                .await?;

            if !step.complete {
                for error in &step.errors {
                    warn!(job_id = %job_id, "{}", error);
                }
                debug!(
                    job_id = %job_id,
                    processed = step.processed,
                    remaining = step.remaining,
                    "Batch advanced"
                );
                tokio::time::sleep(Duration::from_millis(ADVANCE_PAUSE_MS)).await;
                continue;
            }

            let message = step.message.unwrap_or_default();
            info!(job_id = %job_id, "{}", message);

            let archive = if step.packaging_requested {
                let link = self.create_archive().await?;
                info!(zip_url = %link.zip_url, "Archive ready");
                Some(link)
            } else {
                None
            };

            return Ok(RunReport {
                job_id: Some(job_id),
                total,
                processed: step.processed,
                successful: step.successful,
                errors: step.errors,
                message,
                archive,
            });
        }
    }

    fn spawn_progress_poll<F>(&self, job_id: Uuid, on_progress: F) -> tokio::task::JoinHandle<()>
    where
        F: Fn(ProgressSnapshot) + Send + Sync + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(PROGRESS_POLL_MS));
            loop {
                ticker.tick().await;
                match client
                    .post::<ProgressSnapshot>("/api/generation/progress", json!({ "job_id": job_id }))
                    .await
                {
                    Ok(snapshot) => on_progress(snapshot),
                    Err(e) if e.code() == Some("NO_PROGRESS_DATA") => break,
                    Err(e) => debug!(job_id = %job_id, "Progress poll failed: {}", e),
                }
            }
        })
    }

    /// Package all generated PDFs
    pub async fn create_archive(&self) -> Result<ArchiveLink, ClientError> {
        self.post("/api/files/archive", json!({})).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ClientError> {
        let signed = sign_request(body, &self.operator, self.shared_secret);
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(&signed)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let text = response.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => ClientError::Api {
                status: status.as_u16(),
                code: body.error.code,
                message: body.error.message,
            },
            Err(_) => ClientError::Api {
                status: status.as_u16(),
                code: "UNKNOWN".to_string(),
                message: text,
            },
        })
    }
}
