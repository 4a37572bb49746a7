//! Sign-up, sign-in and sign-out passthrough to the identity provider.

use actix_web::{HttpResponse, web};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::auth::{AuthSession, BearerAuth, IdentityProvider, Owner};
use crate::error::{AppError, AppResult};
use crate::models::MessageResponse;

/// Email/password credentials.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CredentialsRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl CredentialsRequest {
    fn into_parts(self) -> AppResult<(String, String)> {
        match (self.email, self.password) {
            (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
                Ok((email.trim().to_string(), password))
            }
            _ => Err(AppError::InvalidInput(
                "Email and password are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignUpResponse {
    pub message: String,
    pub user: Owner,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignInResponse {
    pub message: String,
    pub user: Owner,
    pub session: AuthSession,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub user: Owner,
}

/// Register a new account.
#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    tag = "Auth",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "Account created", body = SignUpResponse),
        (status = 400, description = "Missing credentials or rejected by provider", body = crate::error::ErrorResponse),
    )
)]
pub async fn sign_up(
    provider: web::Data<dyn IdentityProvider>,
    body: web::Json<CredentialsRequest>,
) -> AppResult<HttpResponse> {
    let (email, password) = body.into_inner().into_parts()?;
    let user = provider.sign_up(&email, &password).await?;

    info!("Signed up user {}", user.id);

    Ok(HttpResponse::Created().json(SignUpResponse {
        message: "User created successfully".to_string(),
        user,
    }))
}

/// Exchange credentials for a session.
#[utoipa::path(
    post,
    path = "/api/v1/auth/signin",
    tag = "Auth",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Signed in", body = SignInResponse),
        (status = 400, description = "Missing or invalid credentials", body = crate::error::ErrorResponse),
    )
)]
pub async fn sign_in(
    provider: web::Data<dyn IdentityProvider>,
    body: web::Json<CredentialsRequest>,
) -> AppResult<HttpResponse> {
    let (email, password) = body.into_inner().into_parts()?;
    let (user, session) = provider.sign_in(&email, &password).await?;

    Ok(HttpResponse::Ok().json(SignInResponse {
        message: "Login successful".to_string(),
        user,
        session,
    }))
}

/// Revoke the caller's session.
#[utoipa::path(
    post,
    path = "/api/v1/auth/signout",
    tag = "Auth",
    responses(
        (status = 200, description = "Signed out", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn sign_out(
    auth: BearerAuth,
    provider: web::Data<dyn IdentityProvider>,
) -> AppResult<HttpResponse> {
    provider.sign_out(auth.token.expose_secret()).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Logout successful".to_string(),
    }))
}

/// The authenticated caller.
#[utoipa::path(
    get,
    path = "/api/v1/auth/user",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn current_user(auth: BearerAuth) -> HttpResponse {
    HttpResponse::Ok().json(UserResponse { user: auth.owner })
}

/// Configure auth routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/auth/signup").route(web::post().to(sign_up)))
        .service(web::resource("/auth/signin").route(web::post().to(sign_in)))
        .service(web::resource("/auth/signout").route(web::post().to(sign_out)))
        .service(web::resource("/auth/user").route(web::get().to(current_user)));
}
