//! Image and metadata domain models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::Pagination;

/// Annotation processing status of an image.
///
/// Legal moves: `pending -> processing`, `pending -> failed`,
/// `processing -> completed`, `processing -> failed`. Terminal states
/// never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// States a row may be in for `self` to be written next.
    pub fn predecessors(&self) -> &'static [ProcessingStatus] {
        match self {
            Self::Pending => &[],
            Self::Processing => &[Self::Pending],
            Self::Completed => &[Self::Processing],
            Self::Failed => &[Self::Pending, Self::Processing],
        }
    }

    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        next.predecessors().contains(self)
    }

    /// Checked transition.
    pub fn transition(self, next: ProcessingStatus) -> Result<ProcessingStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: ProcessingStatus,
    pub to: ProcessingStatus,
}

/// Stored image row.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub id: Uuid,
    pub owner_id: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    /// SHA-256 of the original bytes, hex encoded.
    pub content_hash: String,
    pub original_key: String,
    pub original_url: String,
    pub thumbnail_key: String,
    pub thumbnail_url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Annotation state of an image (one-to-one with [`Image`]).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMetadata {
    pub image_id: Uuid,
    pub owner_id: String,
    pub status: ProcessingStatus,
    pub description: String,
    pub tags: Vec<String>,
    pub colors: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl ImageMetadata {
    /// Fresh metadata for a just-stored image.
    pub fn pending(image_id: Uuid, owner_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            image_id,
            owner_id: owner_id.to_string(),
            status: ProcessingStatus::Pending,
            description: String::new(),
            tags: Vec::new(),
            colors: Vec::new(),
            updated_at: now,
        }
    }
}

/// Image joined with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub image: Image,
    pub metadata: ImageMetadata,
}

/// Everything needed to insert an image row (id is assigned up front so
/// artifact keys can embed it).
#[derive(Debug, Clone)]
pub struct NewImage {
    pub id: Uuid,
    pub owner_id: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub content_hash: String,
    pub original_key: String,
    pub original_url: String,
    pub thumbnail_key: String,
    pub thumbnail_url: String,
}

/// Metadata section of an image response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MetadataResponse {
    pub status: ProcessingStatus,
    pub description: String,
    pub tags: Vec<String>,
    pub colors: Vec<String>,
}

/// Image as returned by list, detail and search endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageResponse {
    pub id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub original_url: String,
    pub thumbnail_url: String,
    pub uploaded_at: DateTime<Utc>,
    pub metadata: MetadataResponse,
}

impl From<ImageRecord> for ImageResponse {
    fn from(record: ImageRecord) -> Self {
        let ImageRecord { image, metadata } = record;
        Self {
            id: image.id,
            filename: image.filename,
            content_type: image.content_type,
            size_bytes: image.size_bytes,
            original_url: image.original_url,
            thumbnail_url: image.thumbnail_url,
            uploaded_at: image.uploaded_at,
            metadata: MetadataResponse {
                status: metadata.status,
                description: metadata.description,
                tags: metadata.tags,
                colors: metadata.colors,
            },
        }
    }
}

/// Paginated image list.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageListResponse {
    pub images: Vec<ImageResponse>,
    pub pagination: Pagination,
}

/// Single image wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageDetailResponse {
    pub image: ImageResponse,
}

/// Generic acknowledgement body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Per-file result of a batch upload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadOutcome {
    Uploaded {
        id: Uuid,
        filename: String,
        thumbnail_url: String,
        processing_status: ProcessingStatus,
    },
    Failed {
        filename: String,
        error: String,
    },
}

impl UploadOutcome {
    pub fn failed(filename: impl Into<String>, error: impl ToString) -> Self {
        Self::Failed {
            filename: filename.into(),
            error: error.to_string(),
        }
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self, Self::Uploaded { .. })
    }
}

/// Batch upload response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub results: Vec<UploadOutcome>,
}
