//! Background annotation pipeline.
//!
//! Uploads enqueue an [`AnnotationJob`]; a dispatcher task pulls jobs off a
//! bounded channel and runs at most `workers` of them at once. Each job moves
//! the image `pending -> processing -> completed|failed` through conditional
//! writes, so a job that lost the race (image deleted, already failed by the
//! sweeper) does nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{Semaphore, mpsc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AnnotationSettings;
use crate::db::{GalleryStore, StatusUpdate};
use crate::error::{AppError, AppResult};
use crate::models::{Annotation, ProcessingStatus};
use crate::services::events::{AnnotationEvent, AnnotationEvents};
use crate::services::vision::VisionModel;

/// Work item for one uploaded image.
#[derive(Debug, Clone)]
pub struct AnnotationJob {
    pub image_id: Uuid,
    /// Public URL of the original, handed to the vision model.
    pub image_url: String,
}

/// Runs a single annotation job against the store and the vision model.
#[derive(Clone)]
pub struct Annotator {
    store: Arc<dyn GalleryStore>,
    vision: Arc<dyn VisionModel>,
    timeout: Duration,
    events: AnnotationEvents,
}

impl Annotator {
    pub fn new(
        store: Arc<dyn GalleryStore>,
        vision: Arc<dyn VisionModel>,
        timeout: Duration,
        events: AnnotationEvents,
    ) -> Self {
        Self {
            store,
            vision,
            timeout,
            events,
        }
    }

    /// Annotate one image.
    ///
    /// Returns the terminal status written, or `None` when the image was no
    /// longer pending or was moved on by someone else mid-flight.
    pub async fn annotate(&self, job: AnnotationJob) -> AppResult<Option<ProcessingStatus>> {
        let image_id = job.image_id;

        if !self
            .store
            .advance_status(image_id, StatusUpdate::Processing)
            .await?
        {
            info!("Skipping annotation for {}: no longer pending", image_id);
            return Ok(None);
        }

        match self.request_annotation(&job.image_url).await {
            Ok(annotation) => {
                let tags = annotation.tags.len();
                if !self
                    .store
                    .advance_status(image_id, StatusUpdate::Completed(annotation))
                    .await?
                {
                    warn!("Annotation for {} finished after it left processing", image_id);
                    return Ok(None);
                }
                info!("Annotated image {} ({} tags)", image_id, tags);
                self.events.send(AnnotationEvent::completed(image_id));
                Ok(Some(ProcessingStatus::Completed))
            }
            Err(reason) => {
                warn!("Annotation failed for {}: {}", image_id, reason);
                if !self
                    .store
                    .advance_status(image_id, StatusUpdate::Failed)
                    .await?
                {
                    return Ok(None);
                }
                self.events.send(AnnotationEvent::failed(image_id, &reason));
                Ok(Some(ProcessingStatus::Failed))
            }
        }
    }

    async fn request_annotation(&self, image_url: &str) -> Result<Annotation, String> {
        let reply = tokio::time::timeout(self.timeout, self.vision.describe(image_url))
            .await
            .map_err(|_| format!("vision model timed out after {}s", self.timeout.as_secs()))?
            .map_err(|e| e.to_string())?;

        Annotation::parse(&reply).map_err(|e| format!("unparseable model reply: {}", e))
    }
}

/// Handle for submitting annotation jobs to the worker pool.
#[derive(Clone)]
pub struct AnnotationQueue {
    sender: mpsc::Sender<AnnotationJob>,
    enqueue_timeout: Duration,
}

impl AnnotationQueue {
    /// Spawn the dispatcher and return a handle to its queue.
    pub fn start(annotator: Annotator, settings: &AnnotationSettings) -> Self {
        let (sender, mut receiver) = mpsc::channel::<AnnotationJob>(settings.queue_capacity.max(1));
        let workers = settings.workers.max(1);
        let permits = Arc::new(Semaphore::new(workers));

        tokio::spawn(async move {
            info!(
                "Starting annotation dispatcher ({} workers, queue capacity {})",
                workers,
                receiver.max_capacity()
            );

            while let Some(job) = receiver.recv().await {
                let Ok(permit) = permits.clone().acquire_owned().await else {
                    break;
                };
                let annotator = annotator.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let image_id = job.image_id;
                    if let Err(e) = annotator.annotate(job).await {
                        error!("Annotation job for {} errored: {}", image_id, e);
                    }
                });
            }

            info!("Annotation dispatcher stopped");
        });

        Self {
            sender,
            enqueue_timeout: settings.enqueue_timeout,
        }
    }

    /// Submit a job, waiting up to the enqueue timeout for queue space.
    pub async fn enqueue(&self, job: AnnotationJob) -> AppResult<()> {
        self.sender
            .send_timeout(job, self.enqueue_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(job) => AppError::ServiceUnavailable(format!(
                    "annotation queue full, dropped job for {}",
                    job.image_id
                )),
                SendTimeoutError::Closed(job) => AppError::ServiceUnavailable(format!(
                    "annotation queue closed, dropped job for {}",
                    job.image_id
                )),
            })
    }
}
