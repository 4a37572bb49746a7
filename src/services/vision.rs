//! Vision model client.
//!
//! Talks to an OpenAI-compatible chat-completions endpoint. The image is
//! passed by URL so the model provider fetches it from public storage.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::VisionSettings;
use crate::error::{AppError, AppResult};
use crate::models::ANNOTATION_PROMPT;

/// HTTP connect timeout for vision calls.
const VISION_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Image-to-text model.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Ask the model to annotate the image at `image_url`. Returns the raw
    /// text reply.
    async fn describe(&self, image_url: &str) -> AppResult<String>;
}

/// OpenAI-compatible vision client.
#[derive(Clone)]
pub struct OpenAiVision {
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    max_tokens: u32,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: [ContentPart<'a>; 2],
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

impl OpenAiVision {
    pub fn new(settings: &VisionSettings) -> AppResult<Self> {
        if settings.api_key.is_none() {
            warn!("VISION_API_KEY is not set; vision requests will be unauthenticated");
        }

        let http_client = reqwest::Client::builder()
            .connect_timeout(VISION_CONNECT_TIMEOUT)
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            http_client,
        })
    }

    fn request_body<'a>(&'a self, image_url: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: [
                    ContentPart::Text {
                        text: ANNOTATION_PROMPT,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: image_url },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl VisionModel for OpenAiVision {
    async fn describe(&self, image_url: &str) -> AppResult<String> {
        debug!("Requesting annotation for {}", image_url);

        let mut request = self
            .http_client
            .post(&self.endpoint)
            .json(&self.request_body(image_url));
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "vision model returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let reply: ChatResponse = response.json().await?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::Upstream("vision model returned no content".to_string()))
    }
}
