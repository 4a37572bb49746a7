//! Upload ingestion.
//!
//! Each file of a batch is stored independently: thumbnail, original and
//! thumbnail artifacts, then the image + pending metadata rows, then an
//! annotation job. A failing file yields a `failed` entry and leaves no
//! artifacts or rows behind; its siblings are unaffected.

use std::sync::Arc;

use futures_util::future::join_all;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::Owner;
use crate::db::{GalleryStore, StatusUpdate};
use crate::error::AppResult;
use crate::models::{ImageRecord, NewImage, ProcessingStatus, UploadOutcome};
use crate::services::annotation::{AnnotationJob, AnnotationQueue};
use crate::services::storage::{ArtifactFolders, ArtifactStore, extension_for_content_type};
use crate::services::thumbnail;

/// A file received in an upload request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Stores uploads and hands them to the annotation queue.
#[derive(Clone)]
pub struct IngestionService {
    store: Arc<dyn GalleryStore>,
    artifacts: Arc<dyn ArtifactStore>,
    queue: AnnotationQueue,
    folders: ArtifactFolders,
}

impl IngestionService {
    pub fn new(
        store: Arc<dyn GalleryStore>,
        artifacts: Arc<dyn ArtifactStore>,
        queue: AnnotationQueue,
        folders: ArtifactFolders,
    ) -> Self {
        Self {
            store,
            artifacts,
            queue,
            folders,
        }
    }

    /// Ingest a batch. Returns one outcome per file, in input order.
    pub async fn ingest(&self, owner: &Owner, files: Vec<UploadedFile>) -> Vec<UploadOutcome> {
        let outcomes = join_all(files.into_iter().map(|file| self.ingest_file(owner, file))).await;

        let stored = outcomes.iter().filter(|o| o.is_uploaded()).count();
        info!(
            "Ingested batch for {}: {} stored, {} failed",
            owner.id,
            stored,
            outcomes.len() - stored
        );

        outcomes
    }

    async fn ingest_file(&self, owner: &Owner, file: UploadedFile) -> UploadOutcome {
        let filename = file.filename.clone();

        let record = match self.store_file(owner, file).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to ingest '{}' for {}: {}", filename, owner.id, e);
                return UploadOutcome::failed(filename, e);
            }
        };

        let image_id = record.image.id;
        let mut processing_status = record.metadata.status;

        let job = AnnotationJob {
            image_id,
            image_url: record.image.original_url.clone(),
        };
        if let Err(e) = self.queue.enqueue(job).await {
            warn!("Could not schedule annotation for {}: {}", image_id, e);
            match self.store.advance_status(image_id, StatusUpdate::Failed).await {
                Ok(true) => processing_status = ProcessingStatus::Failed,
                Ok(false) => {}
                Err(e) => error!("Failed to mark {} as failed: {}", image_id, e),
            }
        }

        UploadOutcome::Uploaded {
            id: image_id,
            filename: record.image.filename,
            thumbnail_url: record.image.thumbnail_url,
            processing_status,
        }
    }

    async fn store_file(&self, owner: &Owner, file: UploadedFile) -> AppResult<ImageRecord> {
        let image_id = Uuid::now_v7();
        let content_hash = hex::encode(Sha256::digest(&file.data));
        let size_bytes = file.data.len() as i64;

        // Decoding first rejects undecodable files before anything is written.
        let thumbnail = thumbnail::generate_blocking(file.data.clone()).await?;

        let original_key = self.folders.original_key(
            &owner.id,
            image_id,
            extension_for_content_type(&file.content_type),
        );
        let original = self
            .artifacts
            .put(&original_key, file.data, &file.content_type)
            .await?;

        let thumbnail_key = self
            .folders
            .thumbnail_key(&owner.id, image_id, thumbnail.extension);
        let stored_thumbnail = match self
            .artifacts
            .put(&thumbnail_key, thumbnail.data, thumbnail.content_type)
            .await
        {
            Ok(artifact) => artifact,
            Err(e) => {
                self.discard(&[&original.key]).await;
                return Err(e);
            }
        };

        let new_image = NewImage {
            id: image_id,
            owner_id: owner.id.clone(),
            filename: file.filename,
            content_type: file.content_type,
            size_bytes,
            content_hash,
            original_key: original.key.clone(),
            original_url: original.url,
            thumbnail_key: stored_thumbnail.key.clone(),
            thumbnail_url: stored_thumbnail.url,
        };

        match self.store.create_image(new_image).await {
            Ok(record) => Ok(record),
            Err(e) => {
                self.discard(&[&original.key, &stored_thumbnail.key]).await;
                Err(e)
            }
        }
    }

    /// Best-effort removal of artifacts left behind by a failed ingestion.
    async fn discard(&self, keys: &[&str]) {
        for key in keys {
            if let Err(e) = self.artifacts.delete(key).await {
                warn!("Failed to remove orphaned artifact {}: {}", key, e);
            }
        }
    }
}
