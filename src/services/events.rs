//! Annotation lifecycle events.
//!
//! Uses tokio::sync::broadcast to fan-out status changes to any listener
//! (tests, log sinks). Sending never blocks the annotation workers.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::ProcessingStatus;

/// Default capacity for the broadcast channel.
const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// A status an annotation reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationEvent {
    pub image_id: Uuid,
    pub status: ProcessingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnnotationEvent {
    pub fn completed(image_id: Uuid) -> Self {
        Self {
            image_id,
            status: ProcessingStatus::Completed,
            error: None,
        }
    }

    pub fn failed(image_id: Uuid, error: impl ToString) -> Self {
        Self {
            image_id,
            status: ProcessingStatus::Failed,
            error: Some(error.to_string()),
        }
    }
}

/// Broadcaster for [`AnnotationEvent`]s.
#[derive(Clone)]
pub struct AnnotationEvents {
    sender: broadcast::Sender<AnnotationEvent>,
}

impl AnnotationEvents {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<AnnotationEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of receivers; 0 when nobody listens.
    pub fn send(&self, event: AnnotationEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

/// Log every outcome until the last sender is dropped.
pub fn start_event_log_task(events: &AnnotationEvents) -> JoinHandle<()> {
    let mut receiver = events.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => match event.error {
                    Some(error) => debug!(
                        image_id = %event.image_id,
                        status = %event.status,
                        "Annotation outcome: {}", error
                    ),
                    None => debug!(
                        image_id = %event.image_id,
                        status = %event.status,
                        "Annotation outcome"
                    ),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Annotation event log fell behind, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

impl Default for AnnotationEvents {
    fn default() -> Self {
        Self::new()
    }
}
