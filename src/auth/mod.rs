//! Authentication against the hosted identity provider.
//!
//! The gallery never stores credentials. Bearer tokens are verified by
//! asking the provider who they belong to; sign-up/sign-in/sign-out are
//! passed straight through.

mod extractor;

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::config::AuthSettings;
use crate::error::{AppError, AppResult};

pub use extractor::{AuthError, BearerAuth};

/// HTTP connect timeout for auth provider calls.
const AUTH_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP total timeout for auth provider calls.
const AUTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated user. `id` scopes every image the user owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Owner {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Session issued on sign-in.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Hosted identity provider.
///
/// `verify` failures are `Unauthorized`; rejected sign-up/sign-in are
/// `InvalidInput`; transport problems are `Upstream`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> AppResult<Owner>;

    async fn sign_up(&self, email: &str, password: &str) -> AppResult<Owner>;

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<(Owner, AuthSession)>;

    async fn sign_out(&self, token: &str) -> AppResult<()>;
}

/// Client for a GoTrue-compatible auth REST API.
#[derive(Clone)]
pub struct HostedAuthClient {
    base_url: String,
    anon_key: Option<SecretString>,
    http_client: reqwest::Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(flatten)]
    session: AuthSession,
    user: Owner,
}

/// `/signup` returns the user, or a session wrapping it when
/// auto-confirm is on.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session { user: Owner },
    User(Owner),
}

impl HostedAuthClient {
    pub fn new(settings: &AuthSettings) -> AppResult<Self> {
        if settings.anon_key.is_none() {
            warn!("AUTH_ANON_KEY is not set; the auth provider may reject requests");
        }

        let http_client = reqwest::Client::builder()
            .connect_timeout(AUTH_CONNECT_TIMEOUT)
            .timeout(AUTH_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            anon_key: settings.anon_key.clone(),
            http_client,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .http_client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(ref key) = self.anon_key {
            request = request.header("apikey", key.expose_secret());
        }
        request
    }
}

/// Best human-readable message from a provider error body.
fn provider_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["msg", "error_description", "message", "error"]
                .iter()
                .find_map(|field| v.get(*field).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| "request rejected by auth provider".to_string())
}

/// Map a non-success provider response to `reject`, server errors to `Upstream`.
async fn rejection(
    response: reqwest::Response,
    reject: fn(String) -> AppError,
) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = provider_message(&body);
    if status.is_server_error() {
        AppError::Upstream(format!("auth provider returned {}: {}", status, message))
    } else {
        reject(message)
    }
}

#[async_trait]
impl IdentityProvider for HostedAuthClient {
    async fn verify(&self, token: &str) -> AppResult<Owner> {
        let response = self
            .request(Method::GET, "/user")
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            debug!("Auth provider rejected token: {}", response.status());
            return Err(rejection(response, AppError::Unauthorized).await);
        }

        Ok(response.json().await?)
    }

    async fn sign_up(&self, email: &str, password: &str) -> AppResult<Owner> {
        let response = self
            .request(Method::POST, "/signup")
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, AppError::InvalidInput).await);
        }

        Ok(match response.json::<SignUpResponse>().await? {
            SignUpResponse::Session { user } | SignUpResponse::User(user) => user,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<(Owner, AuthSession)> {
        let response = self
            .request(Method::POST, "/token?grant_type=password")
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, AppError::InvalidInput).await);
        }

        let token: TokenResponse = response.json().await?;
        Ok((token.user, token.session))
    }

    async fn sign_out(&self, token: &str) -> AppResult<()> {
        let response = self
            .request(Method::POST, "/logout")
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, AppError::InvalidInput).await);
        }

        Ok(())
    }
}
