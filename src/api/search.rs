//! Search endpoints over the caller's annotated images.

use actix_web::{HttpResponse, web};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::BearerAuth;
use crate::error::AppResult;
use crate::models::{ImageListResponse, PaginationParams};
use crate::services::GalleryService;

/// Query parameters for text search.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TextSearchQuery {
    /// Term matched against descriptions, tags and colors
    pub q: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Query parameters for color search.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ColorSearchQuery {
    /// Hex color, e.g. `#FF0000`
    pub c: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Search by description substring, tag or color.
#[utoipa::path(
    get,
    path = "/api/v1/search/text",
    tag = "Search",
    params(TextSearchQuery),
    responses(
        (status = 200, description = "Matching images", body = ImageListResponse),
        (status = 400, description = "Missing query", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn search_text(
    auth: BearerAuth,
    query: web::Query<TextSearchQuery>,
    gallery: web::Data<GalleryService>,
) -> AppResult<HttpResponse> {
    let TextSearchQuery { q, page, limit } = query.into_inner();
    let images = gallery
        .search_text(&auth.owner, q.as_deref(), PaginationParams { page, limit })
        .await?;
    Ok(HttpResponse::Ok().json(images))
}

/// Search by dominant color.
#[utoipa::path(
    get,
    path = "/api/v1/search/color",
    tag = "Search",
    params(ColorSearchQuery),
    responses(
        (status = 200, description = "Images containing the color", body = ImageListResponse),
        (status = 400, description = "Missing color", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn search_color(
    auth: BearerAuth,
    query: web::Query<ColorSearchQuery>,
    gallery: web::Data<GalleryService>,
) -> AppResult<HttpResponse> {
    let ColorSearchQuery { c, page, limit } = query.into_inner();
    let images = gallery
        .search_color(&auth.owner, c.as_deref(), PaginationParams { page, limit })
        .await?;
    Ok(HttpResponse::Ok().json(images))
}

/// Images sharing a tag or color with the given image.
#[utoipa::path(
    get,
    path = "/api/v1/search/similar/{image_id}",
    tag = "Search",
    params(
        ("image_id" = String, Path, description = "Source image UUID"),
        ("page" = Option<u32>, Query, description = "Page number (1-indexed, default 1)"),
        ("limit" = Option<u32>, Query, description = "Results per page (default 20, max 100)")
    ),
    responses(
        (status = 200, description = "Similar images, source excluded", body = ImageListResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Source image not found", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn search_similar(
    auth: BearerAuth,
    path: web::Path<String>,
    query: web::Query<PaginationParams>,
    gallery: web::Data<GalleryService>,
) -> AppResult<HttpResponse> {
    let images = gallery
        .search_similar(&auth.owner, &path.into_inner(), query.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(images))
}

/// Configure search routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/search/text").route(web::get().to(search_text)))
        .service(web::resource("/search/color").route(web::get().to(search_color)))
        .service(
            web::resource("/search/similar/{image_id}").route(web::get().to(search_similar)),
        );
}
