//! Stale job eviction
//!
//! Jobs older than the staleness threshold are deleted whether or not they
//! finished. Eviction runs from a background interval task and
//! opportunistically before start and progress requests.

use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{info, warn};

use crate::db::jobs;

/// Evict stale jobs, logging (never propagating) failures
pub async fn sweep_opportunistically(db: &SqlitePool, staleness_secs: u64) -> u64 {
    match jobs::evict_stale_jobs(db, Utc::now(), staleness_secs).await {
        Ok(0) => 0,
        Ok(evicted) => {
            info!(evicted, "Evicted stale generation jobs");
            evicted
        }
        Err(e) => {
            warn!("Stale job eviction failed: {}", e);
            0
        }
    }
}

/// Start the recurring sweeper task
pub fn start_sweeper(db: SqlitePool, staleness_secs: u64, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(sweeper_task(db, staleness_secs, interval_secs))
}

async fn sweeper_task(db: SqlitePool, staleness_secs: u64, interval_secs: u64) {
    let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));

    info!(
        "Stale job sweeper started ({}s interval, {}s threshold)",
        interval_secs, staleness_secs
    );

    loop {
        interval.tick().await;
        sweep_opportunistically(&db, staleness_secs).await;
    }
}
