//! S3 storage for original images and thumbnails.
//!
//! Supports both AWS S3 and MinIO for development. Objects are laid out as
//! `<folder>/<owner>/<image-id>.<ext>` and served from a public base URL.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use secrecy::ExposeSecret;
use tracing::info;
use uuid::Uuid;

use crate::config::StorageSettings;
use crate::error::{AppError, AppResult};

/// Object written to the artifact store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub key: String,
    /// Publicly fetchable URL of the object.
    pub url: String,
}

/// Blob storage for image artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str)
    -> AppResult<StoredArtifact>;

    async fn delete(&self, key: &str) -> AppResult<()>;
}

/// Folder names for originals and thumbnails.
#[derive(Debug, Clone)]
pub struct ArtifactFolders {
    pub originals: String,
    pub thumbnails: String,
}

impl ArtifactFolders {
    pub fn from_settings(settings: &StorageSettings) -> Self {
        Self {
            originals: settings.originals_folder.clone(),
            thumbnails: settings.thumbnails_folder.clone(),
        }
    }

    pub fn original_key(&self, owner_id: &str, image_id: Uuid, extension: &str) -> String {
        artifact_key(&self.originals, owner_id, image_id, extension)
    }

    pub fn thumbnail_key(&self, owner_id: &str, image_id: Uuid, extension: &str) -> String {
        artifact_key(&self.thumbnails, owner_id, image_id, extension)
    }
}

impl Default for ArtifactFolders {
    fn default() -> Self {
        Self {
            originals: crate::config::defaults::ORIGINALS_FOLDER.to_string(),
            thumbnails: crate::config::defaults::THUMBNAILS_FOLDER.to_string(),
        }
    }
}

/// Build an object key in format: {folder}/{owner_id}/{image_id}.{ext}
pub fn artifact_key(folder: &str, owner_id: &str, image_id: Uuid, extension: &str) -> String {
    format!(
        "{}/{}/{}.{}",
        folder.trim_end_matches('/'),
        owner_id,
        image_id,
        extension
    )
}

/// File extension to store an upload under, from its content type.
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    match content_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        _ => "bin",
    }
}

/// S3 storage client wrapper.
#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl Storage {
    /// Create a new S3 storage client from configuration.
    pub async fn new(config: &StorageSettings) -> AppResult<Self> {
        let credentials = Credentials::new(
            &config.access_key,
            config.secret_key.expose_secret(),
            None,
            None,
            "ai-gallery",
        );

        let region = Region::new(config.region.clone());

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(region)
            .credentials_provider(credentials)
            .force_path_style(true); // Required for MinIO

        // Use custom endpoint for MinIO in development
        if let Some(ref endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        let storage = Self {
            client,
            bucket: config.bucket.clone(),
            public_base_url: config.public_base_url.clone(),
        };

        storage.ensure_bucket_exists().await?;

        info!(
            "S3 storage initialized: bucket={}, public_base_url={}",
            config.bucket, config.public_base_url
        );

        Ok(storage)
    }

    /// Ensure the bucket exists, creating it if necessary.
    async fn ensure_bucket_exists(&self) -> AppResult<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!("S3 bucket '{}' exists", self.bucket);
                Ok(())
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    info!("Creating S3 bucket '{}'", self.bucket);
                    self.client
                        .create_bucket()
                        .bucket(&self.bucket)
                        .send()
                        .await
                        .map_err(|e| {
                            AppError::Storage(format!("Failed to create bucket: {}", e))
                        })?;
                    info!("S3 bucket '{}' created", self.bucket);
                    Ok(())
                } else {
                    Err(AppError::Storage(format!(
                        "Failed to access bucket '{}': {}",
                        self.bucket, service_error
                    )))
                }
            }
        }
    }

    /// Public URL of an object key.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[async_trait]
impl ArtifactStore for Storage {
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> AppResult<StoredArtifact> {
        let body = aws_sdk_s3::primitives::ByteStream::from(data);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to upload {} to S3: {}", key, e)))?;

        Ok(StoredArtifact {
            key: key.to_string(),
            url: self.public_url(key),
        })
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete {} from S3: {}", key, e)))?;

        Ok(())
    }
}
