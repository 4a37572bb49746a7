//! Database queries for images and their annotation metadata.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Condition, Expr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Select, SelectTwo, Set, TransactionTrait, UpdateMany,
};
use uuid::Uuid;

use crate::entity::image::{self, Entity as ImageEntity};
use crate::entity::image_metadata::{self, Entity as MetadataEntity};
use crate::error::{AppError, AppResult};
use crate::models::{
    Image, ImageMetadata, ImageRecord, NewImage, PaginationParams, ProcessingStatus,
};

use super::{DbPool, GalleryStore, ImageFilter, StatusUpdate};

const IN_FLIGHT: [ProcessingStatus; 2] = [ProcessingStatus::Pending, ProcessingStatus::Processing];

#[async_trait]
impl GalleryStore for DbPool {
    async fn create_image(&self, new: NewImage) -> AppResult<ImageRecord> {
        let now = Utc::now();
        let txn = self.connection().begin().await?;

        let image = image::ActiveModel {
            id: Set(new.id),
            owner_id: Set(new.owner_id.clone()),
            filename: Set(new.filename),
            content_type: Set(new.content_type),
            size_bytes: Set(new.size_bytes),
            content_hash: Set(new.content_hash),
            original_key: Set(new.original_key),
            original_url: Set(new.original_url),
            thumbnail_key: Set(new.thumbnail_key),
            thumbnail_url: Set(new.thumbnail_url),
            uploaded_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert image: {}", e)))?;

        let metadata = image_metadata::ActiveModel {
            image_id: Set(new.id),
            owner_id: Set(new.owner_id),
            status: Set(ProcessingStatus::Pending.as_str().to_string()),
            description: Set(String::new()),
            tags: Set(Vec::new()),
            colors: Set(Vec::new()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert image metadata: {}", e)))?;

        txn.commit().await?;

        to_record(metadata, image)
    }

    async fn find_image(&self, owner_id: &str, image_id: Uuid) -> AppResult<Option<ImageRecord>> {
        let row = scoped(owner_id, &ImageFilter::All)
            .filter(image_metadata::Column::ImageId.eq(image_id))
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get image: {}", e)))?;

        match row {
            Some((metadata, Some(image))) => Ok(Some(to_record(metadata, image)?)),
            _ => Ok(None),
        }
    }

    async fn list_images(
        &self,
        owner_id: &str,
        filter: &ImageFilter,
        page: &PaginationParams,
    ) -> AppResult<(Vec<ImageRecord>, u64)> {
        if filter.is_unsatisfiable() {
            return Ok((Vec::new(), 0));
        }

        let query = scoped(owner_id, filter);

        let total = query
            .clone()
            .count(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to count images: {}", e)))?;

        let rows = query
            .order_by_desc(image::Column::UploadedAt)
            .order_by_desc(image::Column::Id)
            .offset(page.offset())
            .limit(u64::from(page.clamped_limit()))
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list images: {}", e)))?;

        let records = rows
            .into_iter()
            .filter_map(|(metadata, image)| image.map(|image| to_record(metadata, image)))
            .collect::<AppResult<Vec<_>>>()?;

        Ok((records, total))
    }

    async fn delete_image(&self, owner_id: &str, image_id: Uuid) -> AppResult<Option<Image>> {
        let Some(existing) = owned_image(owner_id, image_id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get image: {}", e)))?
        else {
            return Ok(None);
        };

        let result = ImageEntity::delete_many()
            .filter(image::Column::Id.eq(image_id))
            .filter(image::Column::OwnerId.eq(owner_id))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete image: {}", e)))?;

        if result.rows_affected == 0 {
            return Ok(None);
        }

        Ok(Some(to_image(existing)))
    }

    async fn advance_status(&self, image_id: Uuid, update: StatusUpdate) -> AppResult<bool> {
        let next = update.status();

        let result = status_update(image_id, update)
            .exec(self.connection())
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to set status {} on {}: {}", next, image_id, e))
            })?;

        Ok(result.rows_affected > 0)
    }

    async fn fail_stale(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = stale_update(cutoff)
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to fail stale annotations: {}", e)))?;

        Ok(result.rows_affected)
    }

    async fn ping(&self) -> AppResult<()> {
        self.connection()
            .ping()
            .await
            .map_err(|e| AppError::Database(format!("Database ping failed: {}", e)))
    }
}

/// Moves one row to `update`'s status, guarded on its legal predecessors.
fn status_update(image_id: Uuid, update: StatusUpdate) -> UpdateMany<MetadataEntity> {
    let next = update.status();
    let predecessors: Vec<&str> = next.predecessors().iter().map(|s| s.as_str()).collect();

    let mut changes = image_metadata::ActiveModel {
        status: Set(next.as_str().to_string()),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    if let StatusUpdate::Completed(annotation) = update {
        changes.description = Set(annotation.description);
        changes.tags = Set(annotation.tags);
        changes.colors = Set(annotation.colors);
    }

    MetadataEntity::update_many()
        .set(changes)
        .filter(image_metadata::Column::ImageId.eq(image_id))
        .filter(image_metadata::Column::Status.is_in(predecessors))
}

fn stale_update(cutoff: DateTime<Utc>) -> UpdateMany<MetadataEntity> {
    MetadataEntity::update_many()
        .col_expr(
            image_metadata::Column::Status,
            Expr::value(ProcessingStatus::Failed.as_str()),
        )
        .col_expr(image_metadata::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(image_metadata::Column::Status.is_in(IN_FLIGHT.iter().map(|s| s.as_str())))
        .filter(image_metadata::Column::UpdatedAt.lt(cutoff))
}

/// Metadata joined to its image, restricted to one owner and a filter.
fn scoped(
    owner_id: &str,
    filter: &ImageFilter,
) -> SelectTwo<MetadataEntity, ImageEntity> {
    let mut query = MetadataEntity::find()
        .find_also_related(ImageEntity)
        .filter(image_metadata::Column::OwnerId.eq(owner_id))
        .filter(image::Column::OwnerId.eq(owner_id));

    if let Some(condition) = filter_condition(filter) {
        query = query.filter(condition);
    }

    query
}

fn owned_image(owner_id: &str, image_id: Uuid) -> Select<ImageEntity> {
    ImageEntity::find_by_id(image_id).filter(image::Column::OwnerId.eq(owner_id))
}

fn filter_condition(filter: &ImageFilter) -> Option<Condition> {
    match filter {
        ImageFilter::All => None,
        ImageFilter::Text(term) => Some(
            Condition::any()
                .add(Expr::cust_with_values(
                    r#""image_metadata"."description" ILIKE ?"#,
                    [format!("%{}%", escape_like(term))],
                ))
                .add(Expr::cust_with_values(
                    r#"EXISTS (SELECT 1 FROM unnest("image_metadata"."tags") AS t(value) WHERE lower(t.value) = lower(?))"#,
                    [term.clone()],
                ))
                .add(Expr::cust_with_values(
                    r#"EXISTS (SELECT 1 FROM unnest("image_metadata"."colors") AS c(value) WHERE lower(c.value) = lower(?))"#,
                    [term.clone()],
                )),
        ),
        ImageFilter::Color(color) => Some(Condition::all().add(Expr::cust_with_values(
            format!(r#""image_metadata"."colors" @> {}"#, text_array(1)),
            [color.clone()],
        ))),
        ImageFilter::Similar {
            source_id,
            tags,
            colors,
        } => {
            let mut overlap = Condition::any();
            if !tags.is_empty() {
                overlap = overlap.add(Expr::cust_with_values(
                    format!(r#""image_metadata"."tags" && {}"#, text_array(tags.len())),
                    tags.clone(),
                ));
            }
            if !colors.is_empty() {
                overlap = overlap.add(Expr::cust_with_values(
                    format!(r#""image_metadata"."colors" && {}"#, text_array(colors.len())),
                    colors.clone(),
                ));
            }
            Some(
                Condition::all()
                    .add(image_metadata::Column::ImageId.ne(*source_id))
                    .add(overlap),
            )
        }
    }
}

/// `ARRAY[?, ..]::text[]` with one placeholder per element, so array
/// operators can use the GIN indexes on tags and colors.
fn text_array(len: usize) -> String {
    format!("ARRAY[{}]::text[]", vec!["?"; len].join(", "))
}

/// Escape LIKE metacharacters so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn to_image(m: image::Model) -> Image {
    Image {
        id: m.id,
        owner_id: m.owner_id,
        filename: m.filename,
        content_type: m.content_type,
        size_bytes: m.size_bytes,
        content_hash: m.content_hash,
        original_key: m.original_key,
        original_url: m.original_url,
        thumbnail_key: m.thumbnail_key,
        thumbnail_url: m.thumbnail_url,
        uploaded_at: m.uploaded_at,
    }
}

fn to_record(metadata: image_metadata::Model, image: image::Model) -> AppResult<ImageRecord> {
    let status = ProcessingStatus::parse(&metadata.status).ok_or_else(|| {
        AppError::Database(format!(
            "Unknown status '{}' for image {}",
            metadata.status, metadata.image_id
        ))
    })?;

    Ok(ImageRecord {
        image: to_image(image),
        metadata: ImageMetadata {
            image_id: metadata.image_id,
            owner_id: metadata.owner_id,
            status,
            description: metadata.description,
            tags: metadata.tags,
            colors: metadata.colors,
            updated_at: metadata.updated_at,
        },
    })
}
