//! Actix-web extractor for bearer-token authentication.
//!
//! # Security
//! - The bearer token is wrapped in `SecretString` as soon as it is read
//! - Token values are never logged or exposed in debug output

use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpRequest, HttpResponse, ResponseError, web};
use futures_util::future::LocalBoxFuture;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error};

use super::{IdentityProvider, Owner};
use crate::error::{AppError, ErrorResponse};

/// Read `Authorization: Bearer <token>`.
/// Returns None if the header is missing, not a bearer credential, or empty.
fn extract_bearer_token(req: &HttpRequest) -> Option<SecretString> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(SecretString::from(token.to_string()))
}

/// Authentication error for extractors.
#[derive(Debug)]
pub struct AuthError {
    status: StatusCode,
    message: String,
}

impl AuthError {
    fn unauthorized(message: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.to_string(),
        }
    }
}

impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Upstream(_) => Self {
                status: StatusCode::BAD_GATEWAY,
                message: "Authentication provider unavailable".to_string(),
            },
            _ => Self::unauthorized("Invalid or expired token"),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        let error = if self.status == StatusCode::UNAUTHORIZED {
            "UNAUTHORIZED"
        } else {
            "UPSTREAM_ERROR"
        };
        HttpResponse::build(self.status).json(ErrorResponse {
            error: error.to_string(),
            message: self.message.clone(),
        })
    }
}

/// Extractor that requires a bearer token the identity provider accepts.
///
/// ```ignore
/// async fn protected_handler(auth: BearerAuth) -> impl Responder {
///     // auth.owner is the caller
/// }
/// ```
pub struct BearerAuth {
    pub owner: Owner,
    pub token: SecretString,
}

impl FromRequest for BearerAuth {
    type Error = AuthError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let provider = req.app_data::<web::Data<dyn IdentityProvider>>().cloned();
        let token = extract_bearer_token(req);

        Box::pin(async move {
            let Some(provider) = provider else {
                error!("IdentityProvider missing from app data");
                return Err(AuthError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Internal configuration error".to_string(),
                });
            };

            let token = token.ok_or_else(|| AuthError::unauthorized("Authentication required"))?;

            let owner = provider.verify(token.expose_secret()).await.map_err(|e| {
                debug!("Bearer token rejected: {}", e);
                AuthError::from(e)
            })?;

            Ok(BearerAuth { owner, token })
        })
    }
}
