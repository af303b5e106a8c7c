//! Run lifecycle: start, advance one batch, read progress
//!
//! A run is driven entirely by client requests. `start` persists a job with
//! the resolved transaction queue; each `advance` renders one batch and
//! rewrites the job row; the job row is deleted once its queue is empty.

use mpbi_common::config::ServiceConfig;
use mpbi_common::db::{get_setting, BATCH_SIZE_KEY};
use mpbi_common::{EventBus, GenerationEvent, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{jobs, transactions};
use crate::models::{
    BatchOutcome, CriteriaError, GenerationCriteria, GenerationJob, ProgressSnapshot,
    ResolvedCriteria,
};
use crate::services::cleanup;
use crate::services::renderer::InvoiceRenderer;

/// Result of a start request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    /// Criteria matched nothing; no job was created
    NoMatches,
    Started {
        job_id: Uuid,
        total: usize,
        batch_size: usize,
    },
}

/// Why a run could not be started
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Invalid(#[from] CriteriaError),

    #[error(transparent)]
    Store(#[from] mpbi_common::Error),
}

/// Result of one advance request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    /// No job with that id, or its queue is already empty
    NoProgressData,
    /// Renderer prerequisite missing; the queue was not touched
    RendererUnavailable,
    Advanced {
        processed: usize,
        successful: usize,
        batch_errors: Vec<String>,
        remaining: usize,
        total: usize,
    },
    /// Last batch done; the job has been deleted
    Completed {
        processed: usize,
        successful: usize,
        errors: Vec<String>,
        packaging_requested: bool,
        message: String,
    },
}

/// Executes runs against the job store, the MemberPress tables and a renderer
#[derive(Clone)]
pub struct BatchExecutor {
    db: SqlitePool,
    config: Arc<ServiceConfig>,
    renderer: Arc<dyn InvoiceRenderer>,
    event_bus: EventBus,
}

impl BatchExecutor {
    pub fn new(
        db: SqlitePool,
        config: Arc<ServiceConfig>,
        renderer: Arc<dyn InvoiceRenderer>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            db,
            config,
            renderer,
            event_bus,
        }
    }

    /// Batch size from the `batch_size` setting, else configuration
    ///
    /// A zero or unreadable setting is ignored.
    pub async fn batch_size(&self) -> usize {
        match get_setting::<usize>(&self.db, BATCH_SIZE_KEY).await {
            Ok(Some(size)) if size > 0 => size,
            Ok(_) => self.config.batch_size,
            Err(e) => {
                warn!("Ignoring batch_size setting: {}", e);
                self.config.batch_size
            }
        }
    }

    /// Validate criteria, resolve matching transactions and create a job
    ///
    /// Validation errors are returned before anything is written.
    pub async fn start(
        &self,
        criteria: &GenerationCriteria,
        packaging_requested: bool,
    ) -> std::result::Result<StartOutcome, StartError> {
        let resolved = criteria.validate()?;
        Ok(self.start_resolved(&resolved, packaging_requested).await?)
    }

    async fn start_resolved(
        &self,
        resolved: &ResolvedCriteria,
        packaging_requested: bool,
    ) -> Result<StartOutcome> {
        cleanup::sweep_opportunistically(&self.db, self.config.staleness_secs).await;

        let ids = transactions::resolve_transaction_ids(&self.db, &self.config.table_prefix, resolved)
            .await;
        if ids.is_empty() {
            info!("No transactions matched generation criteria");
            return Ok(StartOutcome::NoMatches);
        }

        let job = GenerationJob::new(ids, packaging_requested);
        jobs::save_job(&self.db, &job).await?;
        let batch_size = self.batch_size().await;

        info!(
            job_id = %job.job_id,
            total = job.total,
            batch_size,
            packaging_requested,
            "Generation run started"
        );
        self.event_bus.emit_lossy(GenerationEvent::RunStarted {
            job_id: job.job_id,
            total: job.total,
            timestamp: job.created_at,
        });

        Ok(StartOutcome::Started {
            job_id: job.job_id,
            total: job.total,
            batch_size,
        })
    }

    /// Render the next batch of a job
    pub async fn advance(&self, job_id: Uuid) -> Result<AdvanceOutcome> {
        let Some(mut job) = jobs::load_job(&self.db, job_id).await? else {
            debug!(job_id = %job_id, "Advance requested for unknown job");
            return Ok(AdvanceOutcome::NoProgressData);
        };
        if job.is_complete() {
            return Ok(AdvanceOutcome::NoProgressData);
        }

        if !self.renderer.is_available().await {
            warn!(
                job_id = %job_id,
                renderer = self.renderer.name(),
                "Invoice renderer unavailable, batch not processed"
            );
            return Ok(AdvanceOutcome::RendererUnavailable);
        }

        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let batch = job.take_batch(self.batch_size().await);
        let outcome = self.render_batch(&batch).await;
        job.apply_batch(&outcome);

        if job.is_complete() {
            jobs::delete_job(&self.db, job_id).await?;

            let message = completion_message(job.successful, job.errors.len());
            info!(
                job_id = %job_id,
                processed = job.processed,
                successful = job.successful,
                errors = job.errors.len(),
                "Generation run completed"
            );
            self.event_bus.emit_lossy(GenerationEvent::RunCompleted {
                job_id,
                processed: job.processed,
                successful: job.successful,
                error_count: job.errors.len(),
                packaging_requested: job.packaging_requested,
            });

            return Ok(AdvanceOutcome::Completed {
                processed: job.processed,
                successful: job.successful,
                errors: job.errors,
                packaging_requested: job.packaging_requested,
                message,
            });
        }

        jobs::save_job(&self.db, &job).await?;

        debug!(
            job_id = %job_id,
            processed = job.processed,
            remaining = job.remaining(),
            "Batch processed"
        );
        self.event_bus.emit_lossy(GenerationEvent::BatchAdvanced {
            job_id,
            processed: job.processed,
            successful: job.successful,
            remaining: job.remaining(),
            total: job.total,
        });

        Ok(AdvanceOutcome::Advanced {
            processed: job.processed,
            successful: job.successful,
            batch_errors: outcome.errors,
            remaining: job.remaining(),
            total: job.total,
        })
    }

    async fn render_batch(&self, batch: &[i64]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for &txn_id in batch {
            let txn = match transactions::load_transaction(&self.db, &self.config.table_prefix, txn_id)
                .await
            {
                Ok(Some(txn)) => txn,
                Ok(None) => {
                    debug!(txn_id, "Transaction no longer exists, skipping");
                    outcome.record_skipped();
                    continue;
                }
                Err(e) => {
                    outcome.record_error(item_error(txn_id, &e));
                    continue;
                }
            };

            match self.renderer.render(&txn, &self.config.output_dir).await {
                Ok(Some(path)) => {
                    debug!(txn_id, path = %path.display(), "Invoice rendered");
                    outcome.record_success();
                }
                Ok(None) => outcome.record_skipped(),
                Err(e) => {
                    warn!(txn_id, "Invoice rendering failed: {}", e);
                    outcome.record_error(item_error(txn_id, &e));
                }
            }
        }

        outcome
    }

    /// Snapshot of a job, after evicting stale jobs
    pub async fn progress(&self, job_id: Uuid) -> Result<Option<ProgressSnapshot>> {
        cleanup::sweep_opportunistically(&self.db, self.config.staleness_secs).await;
        Ok(jobs::load_job(&self.db, job_id)
            .await?
            .map(|job| job.snapshot()))
    }
}

fn item_error(txn_id: i64, error: &dyn std::fmt::Display) -> String {
    format!("Error generating invoice for transaction {}: {}", txn_id, error)
}

/// "Successfully generated N invoices." plus the error count when non-zero
pub fn completion_message(successful: usize, error_count: usize) -> String {
    let mut message = format!("Successfully generated {} invoices.", successful);
    if error_count > 0 {
        message.push_str(&format!(" {} errors occurred.", error_count));
    }
    message
}
