//! Image upload, listing, lookup and deletion endpoints.

use std::sync::Arc;

use actix_multipart::{Field, Multipart};
use actix_web::{HttpResponse, web};
use futures_util::StreamExt;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::auth::BearerAuth;
use crate::config::UploadSettings;
use crate::error::{AppError, AppResult};
use crate::models::{
    ImageDetailResponse, ImageListResponse, MessageResponse, PaginationParams, UploadOutcome,
    UploadResponse,
};
use crate::services::{GalleryService, IngestionService, UploadedFile};

/// Read a field fully unless it exceeds `max_size` bytes.
/// Oversized fields are drained and yield `None`.
async fn read_limited(field: &mut Field, max_size: usize) -> AppResult<Option<Vec<u8>>> {
    let mut data = Vec::new();
    let mut oversized = false;

    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::InvalidInput(format!("Read error: {}", e)))?;
        if oversized {
            continue;
        }
        if data.len() + chunk.len() > max_size {
            oversized = true;
            data = Vec::new();
            continue;
        }
        data.extend_from_slice(&chunk);
    }

    Ok((!oversized).then_some(data))
}

async fn drain(field: &mut Field) {
    while let Some(chunk) = field.next().await {
        let _ = chunk;
    }
}

/// Upload a batch of images.
///
/// POST /images/upload
/// Content-Type: multipart/form-data
/// Authorization: Bearer <token>
///
/// Every file part is processed independently; the response lists one
/// result per file in the order they were sent.
#[utoipa::path(
    post,
    path = "/api/v1/images/upload",
    tag = "Images",
    request_body(content_type = "multipart/form-data", description = "One or more image files"),
    responses(
        (status = 200, description = "Per-file upload results", body = UploadResponse),
        (status = 400, description = "No files or too many files", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 503, description = "Too many concurrent uploads", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn upload_images(
    auth: BearerAuth,
    mut payload: Multipart,
    ingestion: web::Data<IngestionService>,
    limits: web::Data<UploadSettings>,
    upload_semaphore: web::Data<Arc<Semaphore>>,
) -> AppResult<HttpResponse> {
    // Acquire upload permit (bounds memory held by in-flight uploads)
    let _permit = upload_semaphore.try_acquire().map_err(|_| {
        warn!("Upload rejected for {}: too many concurrent uploads", auth.owner.id);
        AppError::ServiceUnavailable(
            "Too many concurrent uploads. Please try again later.".to_string(),
        )
    })?;

    // Accepted files, or the rejection for a file that never reaches ingestion
    let mut slots: Vec<Result<UploadedFile, UploadOutcome>> = Vec::new();

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::InvalidInput(format!("Multipart error: {}", e)))?;

        // Plain form fields carry no file
        let Some(filename) = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string)
        else {
            drain(&mut field).await;
            continue;
        };

        if slots.len() >= limits.max_files_per_request {
            return Err(AppError::InvalidInput(format!(
                "Too many files: at most {} per upload",
                limits.max_files_per_request
            )));
        }

        let content_type = field
            .content_type()
            .filter(|ct| ct.type_() == mime::IMAGE)
            .map(|ct| ct.essence_str().to_string());
        let Some(content_type) = content_type else {
            drain(&mut field).await;
            slots.push(Err(UploadOutcome::failed(
                filename,
                "Only image files are allowed",
            )));
            continue;
        };

        match read_limited(&mut field, limits.max_file_size).await? {
            Some(data) if data.is_empty() => {
                slots.push(Err(UploadOutcome::failed(filename, "File is empty")));
            }
            Some(data) => slots.push(Ok(UploadedFile {
                filename,
                content_type,
                data,
            })),
            None => slots.push(Err(UploadOutcome::failed(
                filename,
                format!(
                    "File exceeds the {}MB size limit",
                    limits.max_file_size / 1024 / 1024
                ),
            ))),
        }
    }

    if slots.is_empty() {
        return Err(AppError::InvalidInput("No files uploaded".to_string()));
    }

    let mut files = Vec::new();
    let mut order = Vec::with_capacity(slots.len());
    for slot in slots {
        match slot {
            Ok(file) => {
                files.push(file);
                order.push(None);
            }
            Err(rejected) => order.push(Some(rejected)),
        }
    }

    info!(
        "Upload from {}: {} files accepted, {} rejected",
        auth.owner.id,
        files.len(),
        order.len() - files.len()
    );

    let mut ingested = ingestion.ingest(&auth.owner, files).await.into_iter();
    let results: Vec<UploadOutcome> = order
        .into_iter()
        .filter_map(|rejected| rejected.or_else(|| ingested.next()))
        .collect();

    Ok(HttpResponse::Ok().json(UploadResponse { results }))
}

/// List the caller's images, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/images",
    tag = "Images",
    params(
        ("page" = Option<u32>, Query, description = "Page number (1-indexed, default 1)"),
        ("limit" = Option<u32>, Query, description = "Results per page (default 20, max 100)")
    ),
    responses(
        (status = 200, description = "Paginated images", body = ImageListResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn list_images(
    auth: BearerAuth,
    query: web::Query<PaginationParams>,
    gallery: web::Data<GalleryService>,
) -> AppResult<HttpResponse> {
    let images = gallery.list(&auth.owner, query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(images))
}

/// Get one of the caller's images.
#[utoipa::path(
    get,
    path = "/api/v1/images/{image_id}",
    tag = "Images",
    params(
        ("image_id" = String, Path, description = "Image UUID")
    ),
    responses(
        (status = 200, description = "Image with metadata", body = ImageDetailResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Image not found", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn get_image(
    auth: BearerAuth,
    path: web::Path<String>,
    gallery: web::Data<GalleryService>,
) -> AppResult<HttpResponse> {
    let image = gallery.get(&auth.owner, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ImageDetailResponse { image }))
}

/// Delete one of the caller's images and its stored files.
#[utoipa::path(
    delete,
    path = "/api/v1/images/{image_id}",
    tag = "Images",
    params(
        ("image_id" = String, Path, description = "Image UUID")
    ),
    responses(
        (status = 200, description = "Image deleted", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Image not found", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn delete_image(
    auth: BearerAuth,
    path: web::Path<String>,
    gallery: web::Data<GalleryService>,
) -> AppResult<HttpResponse> {
    gallery.delete(&auth.owner, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Image deleted successfully".to_string(),
    }))
}

/// Configure image routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/images").route(web::get().to(list_images)))
        .service(web::resource("/images/upload").route(web::post().to(upload_images)))
        .service(
            web::resource("/images/{image_id}")
                .route(web::get().to(get_image))
                .route(web::delete().to(delete_image)),
        );
}
