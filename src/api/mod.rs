//! API endpoint modules.

use actix_web::web;

use crate::error::AppError;

pub mod auth;
pub mod health;
pub mod images;
pub mod openapi;
pub mod search;

pub use auth::configure_routes as configure_auth_routes;
pub use health::configure_health_routes;
pub use images::configure_routes as configure_image_routes;
pub use openapi::ApiDoc;
pub use search::configure_routes as configure_search_routes;

/// Mount every route under the current scope, with JSON error bodies for
/// malformed query strings and request bodies.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| AppError::InvalidInput(err.to_string()).into()),
    )
    .app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| AppError::InvalidInput(err.to_string()).into()),
    )
    .configure(configure_health_routes)
    .configure(configure_auth_routes)
    .configure(configure_image_routes)
    .configure(configure_search_routes);
}
