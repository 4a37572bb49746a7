//! Database module providing connection management, migrations, and the
//! gallery persistence seam.

pub mod images;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::config::DatabaseSettings;
use crate::error::{AppError, AppResult};
use crate::migration::Migrator;
use crate::models::{Annotation, Image, ImageRecord, NewImage, PaginationParams, ProcessingStatus};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Connect to PostgreSQL using the configured pool bounds.
    pub async fn new(settings: &DatabaseSettings) -> AppResult<Self> {
        let mut options = ConnectOptions::new(settings.url.clone());
        options
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let conn = Database::connect(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to database: {}", e)))?;

        Ok(Self { conn })
    }

    /// Apply pending migrations.
    pub async fn run_migrations(&self) -> AppResult<()> {
        Migrator::up(&self.conn, None)
            .await
            .map_err(|e| AppError::Database(format!("Failed to run migrations: {}", e)))?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Get access to the underlying connection.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }
}

/// Status write requested by the annotation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Processing,
    Completed(Annotation),
    /// Content fields are left untouched.
    Failed,
}

impl StatusUpdate {
    pub fn status(&self) -> ProcessingStatus {
        match self {
            Self::Processing => ProcessingStatus::Processing,
            Self::Completed(_) => ProcessingStatus::Completed,
            Self::Failed => ProcessingStatus::Failed,
        }
    }
}

/// Which of an owner's images a listing returns.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageFilter {
    All,
    /// Case-insensitive substring of the description, or a tag/color equal
    /// to the term ignoring case.
    Text(String),
    /// Exact element of the colors list.
    Color(String),
    /// Any shared tag or color with the source image, source excluded.
    Similar {
        source_id: Uuid,
        tags: Vec<String>,
        colors: Vec<String>,
    },
}

impl ImageFilter {
    /// True when no row can ever match.
    pub fn is_unsatisfiable(&self) -> bool {
        matches!(self, Self::Similar { tags, colors, .. } if tags.is_empty() && colors.is_empty())
    }

    /// Evaluate the filter against a loaded record.
    pub fn matches(&self, record: &ImageRecord) -> bool {
        let metadata = &record.metadata;
        match self {
            Self::All => true,
            Self::Text(term) => {
                let needle = term.to_lowercase();
                metadata.description.to_lowercase().contains(&needle)
                    || metadata.tags.iter().any(|t| t.eq_ignore_ascii_case(term))
                    || metadata.colors.iter().any(|c| c.eq_ignore_ascii_case(term))
            }
            Self::Color(color) => metadata.colors.iter().any(|c| c == color),
            Self::Similar {
                source_id,
                tags,
                colors,
            } => {
                record.image.id != *source_id
                    && (metadata.tags.iter().any(|t| tags.contains(t))
                        || metadata.colors.iter().any(|c| colors.contains(c)))
            }
        }
    }
}

/// Persistence for images and their metadata.
///
/// Every read and delete is scoped to an owner. Status writes are
/// conditional on the row's current status so the state machine holds
/// across concurrent writers.
#[async_trait]
pub trait GalleryStore: Send + Sync {
    /// Insert the image row and its pending metadata row atomically.
    async fn create_image(&self, image: NewImage) -> AppResult<ImageRecord>;

    async fn find_image(&self, owner_id: &str, image_id: Uuid) -> AppResult<Option<ImageRecord>>;

    /// Owner's matching images newest first, plus the total match count.
    async fn list_images(
        &self,
        owner_id: &str,
        filter: &ImageFilter,
        page: &PaginationParams,
    ) -> AppResult<(Vec<ImageRecord>, u64)>;

    /// Delete the image (metadata cascades). Returns the deleted row.
    async fn delete_image(&self, owner_id: &str, image_id: Uuid) -> AppResult<Option<Image>>;

    /// Apply `update` if the row's status is one of its predecessors.
    /// Returns false when the row is gone or in another state.
    async fn advance_status(&self, image_id: Uuid, update: StatusUpdate) -> AppResult<bool>;

    /// Fail pending/processing rows not touched since `cutoff`.
    async fn fail_stale(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;

    /// Connectivity check for readiness probes.
    async fn ping(&self) -> AppResult<()>;
}
