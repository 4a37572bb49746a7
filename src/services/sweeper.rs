//! Sweeper for annotations that never finished.
//!
//! A restart loses queued and in-flight jobs, leaving rows stuck in
//! pending/processing. The sweeper periodically fails rows that have not
//! moved for longer than the stale threshold and were last touched before
//! this process started. Rows written since start-up belong to the live
//! annotation queue, which always drives them to a terminal status.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;
use tracing::{error, info};

use crate::config::AnnotationSettings;
use crate::db::GalleryStore;
use crate::error::{AppError, AppResult};

/// Configuration for the sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How long a row may sit in pending/processing
    pub stale_after: Duration,
    /// How often to sweep
    pub interval: Duration,
    /// Start of the current process; newer rows are never swept
    pub started_at: DateTime<Utc>,
}

impl From<&AnnotationSettings> for SweeperConfig {
    fn from(settings: &AnnotationSettings) -> Self {
        Self {
            stale_after: settings.stale_after,
            interval: settings.sweep_interval,
            started_at: Utc::now(),
        }
    }
}

/// Start the sweeper background task.
pub fn start_sweeper_task(store: Arc<dyn GalleryStore>, config: SweeperConfig) {
    tokio::spawn(async move {
        info!(
            "Starting annotation sweeper (stale after: {} seconds, interval: {} seconds)",
            config.stale_after.as_secs(),
            config.interval.as_secs()
        );

        let mut ticker = interval(config.interval);

        loop {
            ticker.tick().await;

            if let Err(e) = sweep_once(store.as_ref(), &config).await {
                error!("Annotation sweeper error: {}", e);
            }
        }
    });
}

/// Run a single sweep. Returns the number of rows failed.
pub async fn sweep_once(store: &dyn GalleryStore, config: &SweeperConfig) -> AppResult<u64> {
    let cutoff = cutoff(config, Utc::now())?;

    let failed = store.fail_stale(cutoff).await?;
    if failed > 0 {
        info!("Marked {} stale annotations as failed", failed);
    }

    Ok(failed)
}

/// The later of "stale" and "from an earlier process" wins.
fn cutoff(config: &SweeperConfig, now: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
    let stale_after = chrono::Duration::from_std(config.stale_after)
        .map_err(|e| AppError::InvalidInput(format!("Invalid stale threshold: {}", e)))?;
    Ok((now - stale_after).min(config.started_at))
}
