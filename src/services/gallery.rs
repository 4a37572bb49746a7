//! Read side of the gallery: listing, lookup, deletion and search.
//!
//! Every call takes the caller's [`Owner`]; no query can reach another
//! owner's rows.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Owner;
use crate::db::{GalleryStore, ImageFilter};
use crate::error::{AppError, AppResult};
use crate::models::{
    ImageListResponse, ImageRecord, ImageResponse, Pagination, PaginationParams,
    normalize_hex_color,
};
use crate::services::storage::ArtifactStore;

#[derive(Clone)]
pub struct GalleryService {
    store: Arc<dyn GalleryStore>,
    artifacts: Arc<dyn ArtifactStore>,
}

/// Image ids arrive as path strings; anything unparsable cannot be owned.
fn parse_image_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| image_not_found())
}

fn image_not_found() -> AppError {
    AppError::NotFound("Image".to_string())
}

impl GalleryService {
    pub fn new(store: Arc<dyn GalleryStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { store, artifacts }
    }

    pub async fn list(&self, owner: &Owner, page: PaginationParams) -> AppResult<ImageListResponse> {
        self.query(owner, ImageFilter::All, page).await
    }

    pub async fn get(&self, owner: &Owner, image_id: &str) -> AppResult<ImageResponse> {
        self.find(owner, image_id).await.map(ImageResponse::from)
    }

    /// Delete the image and its metadata, then its artifacts (best effort).
    pub async fn delete(&self, owner: &Owner, image_id: &str) -> AppResult<()> {
        let id = parse_image_id(image_id)?;
        let image = self
            .store
            .delete_image(&owner.id, id)
            .await?
            .ok_or_else(image_not_found)?;

        info!("Deleted image {} for {}", id, owner.id);

        for key in [&image.original_key, &image.thumbnail_key] {
            if let Err(e) = self.artifacts.delete(key).await {
                warn!("Failed to delete artifact {} of image {}: {}", key, id, e);
            }
        }

        Ok(())
    }

    pub async fn search_text(
        &self,
        owner: &Owner,
        q: Option<&str>,
        page: PaginationParams,
    ) -> AppResult<ImageListResponse> {
        let term = q
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AppError::InvalidInput("Search query is required".to_string()))?;

        self.query(owner, ImageFilter::Text(term.to_string()), page)
            .await
    }

    /// Valid hex input is normalized to the stored `#RRGGBB` form; anything
    /// else is matched verbatim.
    pub async fn search_color(
        &self,
        owner: &Owner,
        c: Option<&str>,
        page: PaginationParams,
    ) -> AppResult<ImageListResponse> {
        let raw = c
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::InvalidInput("Color parameter is required".to_string()))?;
        let color = normalize_hex_color(raw).unwrap_or_else(|| raw.to_string());

        self.query(owner, ImageFilter::Color(color), page).await
    }

    pub async fn search_similar(
        &self,
        owner: &Owner,
        image_id: &str,
        page: PaginationParams,
    ) -> AppResult<ImageListResponse> {
        let source = self.find(owner, image_id).await?;

        let filter = ImageFilter::Similar {
            source_id: source.image.id,
            tags: source.metadata.tags,
            colors: source.metadata.colors,
        };

        self.query(owner, filter, page).await
    }

    async fn find(&self, owner: &Owner, image_id: &str) -> AppResult<ImageRecord> {
        let id = parse_image_id(image_id)?;
        self.store
            .find_image(&owner.id, id)
            .await?
            .ok_or_else(image_not_found)
    }

    async fn query(
        &self,
        owner: &Owner,
        filter: ImageFilter,
        page: PaginationParams,
    ) -> AppResult<ImageListResponse> {
        let (records, total) = self.store.list_images(&owner.id, &filter, &page).await?;

        Ok(ImageListResponse {
            images: records.into_iter().map(ImageResponse::from).collect(),
            pagination: Pagination::new(&page, total),
        })
    }
}
