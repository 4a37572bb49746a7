//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, auth, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "AI Gallery Server",
        version = "0.1.0",
        description = "Upload photos, have them tagged, described and color-profiled by a vision model, and search your gallery"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Auth endpoints
        api::auth::sign_up,
        api::auth::sign_in,
        api::auth::sign_out,
        api::auth::current_user,
        // Image endpoints
        api::images::upload_images,
        api::images::list_images,
        api::images::get_image,
        api::images::delete_image,
        // Search endpoints
        api::search::search_text,
        api::search::search_color,
        api::search::search_similar,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            models::MessageResponse,
            models::Pagination,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Auth
            auth::Owner,
            auth::AuthSession,
            api::auth::CredentialsRequest,
            api::auth::SignUpResponse,
            api::auth::SignInResponse,
            api::auth::UserResponse,
            // Images
            models::ProcessingStatus,
            models::MetadataResponse,
            models::ImageResponse,
            models::ImageListResponse,
            models::ImageDetailResponse,
            models::UploadOutcome,
            models::UploadResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Auth", description = "Account passthrough to the identity provider"),
        (name = "Images", description = "Upload and manage images"),
        (name = "Search", description = "Search annotated images")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Add bearer token security scheme.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .build(),
                ),
            );
        }
    }
}
