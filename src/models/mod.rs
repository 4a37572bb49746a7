//! Domain models for the gallery server.

use utoipa::ToSchema;

pub mod annotation;
pub mod image;

// Re-export commonly used types
pub use annotation::{ANNOTATION_PROMPT, Annotation, AnnotationParseError, normalize_hex_color};
pub use image::{
    Image, ImageDetailResponse, ImageListResponse, ImageMetadata, ImageRecord, ImageResponse,
    MessageResponse, MetadataResponse, NewImage, ProcessingStatus, TransitionError, UploadOutcome,
    UploadResponse,
};

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

/// Pagination parameters (1-indexed page).
#[derive(Debug, Clone, Copy, Default, serde::Deserialize, ToSchema)]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PaginationParams {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    /// Requested page; missing or zero means the first page.
    pub fn page(&self) -> u32 {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }

    /// Clamp limit to `1..=100`, defaulting to 20.
    pub fn clamped_limit(&self) -> u32 {
        match self.limit {
            None | Some(0) => DEFAULT_LIMIT,
            Some(limit) => limit.min(MAX_LIMIT),
        }
    }

    /// Calculate the offset for database queries.
    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.clamped_limit())
    }
}

/// Pagination metadata for responses.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    /// Create pagination metadata; `total_pages = ceil(total / limit)`.
    pub fn new(params: &PaginationParams, total: u64) -> Self {
        let limit = params.clamped_limit();
        Pagination {
            page: params.page(),
            limit,
            total,
            total_pages: total.div_ceil(u64::from(limit)),
        }
    }
}
