//! Shared test helpers for gallery E2E tests.

use actix_web::{App, dev::ServiceResponse, test, web};
use ai_gallery_lib::api;
use ai_gallery_lib::auth::IdentityProvider;
use ai_gallery_lib::config::{AnnotationSettings, UploadSettings};
use ai_gallery_lib::db::GalleryStore;
use ai_gallery_lib::models::ProcessingStatus;
use ai_gallery_lib::services::{
    AnnotationEvents, AnnotationQueue, Annotator, ArtifactFolders, ArtifactStore, GalleryService,
    IngestionService,
};
use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb, RgbImage};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::fakes::{MemoryArtifacts, MemoryStore, ScriptedVision, StaticIdentity};

const BOUNDARY: &str = "----gallery-e2e-boundary";

/// Fakes plus the settings the app is built from. Adjust fields before
/// calling [`TestContext::app`].
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub artifacts: Arc<MemoryArtifacts>,
    pub vision: Arc<ScriptedVision>,
    pub identity: Arc<StaticIdentity>,
    pub events: AnnotationEvents,
    pub upload: UploadSettings,
    pub annotation: AnnotationSettings,
    pub vision_timeout: Duration,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::default()),
            artifacts: Arc::new(MemoryArtifacts::default()),
            vision: Arc::new(ScriptedVision::default()),
            identity: Arc::new(StaticIdentity::default()),
            events: AnnotationEvents::new(),
            upload: UploadSettings::default(),
            annotation: AnnotationSettings {
                enqueue_timeout: Duration::from_millis(200),
                ..AnnotationSettings::default()
            },
            vision_timeout: Duration::from_secs(5),
        }
    }

    pub fn annotator(&self) -> Annotator {
        Annotator::new(
            self.store.clone(),
            self.vision.clone(),
            self.vision_timeout,
            self.events.clone(),
        )
    }

    /// Build the app the way `main` wires it, with fakes behind every seam.
    pub async fn app(
        &self,
    ) -> impl actix_web::dev::Service<
        actix_http::Request,
        Response = ServiceResponse,
        Error = actix_web::Error,
    > {
        let store: Arc<dyn GalleryStore> = self.store.clone();
        let artifacts: Arc<dyn ArtifactStore> = self.artifacts.clone();
        let identity: Arc<dyn IdentityProvider> = self.identity.clone();

        let queue = AnnotationQueue::start(self.annotator(), &self.annotation);
        let ingestion = IngestionService::new(
            store.clone(),
            artifacts.clone(),
            queue,
            ArtifactFolders::default(),
        );
        let gallery = GalleryService::new(store.clone(), artifacts);
        let semaphore = Arc::new(Semaphore::new(self.upload.max_concurrent_uploads));

        test::init_service(
            App::new()
                .app_data(web::Data::from(store))
                .app_data(web::Data::from(identity))
                .app_data(web::Data::new(ingestion))
                .app_data(web::Data::new(gallery))
                .app_data(web::Data::new(self.upload.clone()))
                .app_data(web::Data::new(semaphore))
                .service(web::scope("/api/v1").configure(api::configure)),
        )
        .await
    }

    /// Poll the store until the image reaches `status`.
    pub async fn wait_for_status(&self, image_id: Uuid, status: ProcessingStatus) {
        for _ in 0..200 {
            if self.store.status_of(image_id) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "image {} never reached {:?} (now {:?})",
            image_id,
            status,
            self.store.status_of(image_id)
        );
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Solid-color PNG.
pub fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let img: RgbImage = ImageBuffer::from_pixel(width, height, Rgb(color));
    encode(img, ImageOutputFormat::Png)
}

/// PNG of pseudo-random pixels, which does not compress well.
pub fn noisy_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    let img: RgbImage = ImageBuffer::from_fn(width, height, |_, _| {
        let mut next = || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        };
        Rgb([next(), next(), next()])
    });
    encode(img, ImageOutputFormat::Png)
}

fn encode(img: RgbImage, format: ImageOutputFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, format)
        .expect("failed to encode test image");
    out.into_inner()
}

/// A file part of a multipart upload.
pub struct Part {
    pub filename: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Part {
    pub fn file(filename: &str, content_type: &str, data: Vec<u8>) -> Self {
        Self {
            filename: Some(filename.to_string()),
            content_type: content_type.to_string(),
            data,
        }
    }

    pub fn png(filename: &str, data: Vec<u8>) -> Self {
        Self::file(filename, "image/png", data)
    }

    /// A plain form field (no filename).
    pub fn field(value: &str) -> Self {
        Self {
            filename: None,
            content_type: "text/plain".to_string(),
            data: value.as_bytes().to_vec(),
        }
    }
}

/// Encode parts as a `multipart/form-data` body.
pub fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match &part.filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"images\"; filename=\"{}\"\r\n",
                    filename
                )
                .as_bytes(),
            ),
            None => body
                .extend_from_slice(b"Content-Disposition: form-data; name=\"note\"\r\n"),
        }
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", part.content_type).as_bytes());
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Upload parts; `token` of `None` sends no Authorization header.
pub async fn upload<S>(app: &S, token: Option<&str>, parts: &[Part]) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let mut req = test::TestRequest::post()
        .uri("/api/v1/images/upload")
        .insert_header((
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(multipart_body(parts));
    if let Some(token) = token {
        req = req.insert_header(("Authorization", format!("Bearer {}", token)));
    }

    let resp = test::call_service(app, req.to_request()).await;
    let status = resp.status().as_u16();
    let body: Value = test::read_body_json(resp).await;
    (status, body)
}

/// GET a path under `/api/v1` with an optional bearer token.
pub async fn get_json<S>(app: &S, token: Option<&str>, path: &str) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let mut req = test::TestRequest::get().uri(&format!("/api/v1{}", path));
    if let Some(token) = token {
        req = req.insert_header(("Authorization", format!("Bearer {}", token)));
    }

    let resp = test::call_service(app, req.to_request()).await;
    let status = resp.status().as_u16();
    let body: Value = test::read_body_json(resp).await;
    (status, body)
}

/// DELETE an image with a bearer token.
pub async fn delete_image<S>(app: &S, token: &str, image_id: &str) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/images/{}", image_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();

    let resp = test::call_service(app, req).await;
    let status = resp.status().as_u16();
    let body: Value = test::read_body_json(resp).await;
    (status, body)
}

/// POST a JSON body to a path under `/api/v1`.
pub async fn post_json<S>(app: &S, token: Option<&str>, path: &str, body: Value) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let mut req = test::TestRequest::post()
        .uri(&format!("/api/v1{}", path))
        .set_json(body);
    if let Some(token) = token {
        req = req.insert_header(("Authorization", format!("Bearer {}", token)));
    }

    let resp = test::call_service(app, req.to_request()).await;
    let status = resp.status().as_u16();
    let body: Value = test::read_body_json(resp).await;
    (status, body)
}

/// Ids of the images in a list/search response, in order.
pub fn image_ids(body: &Value) -> Vec<String> {
    body["images"]
        .as_array()
        .expect("response has no images array")
        .iter()
        .map(|img| img["id"].as_str().unwrap().to_string())
        .collect()
}

/// Id of the n-th upload result.
pub fn uploaded_id(body: &Value, index: usize) -> Uuid {
    let result = &body["results"][index];
    assert_eq!(result["status"], "uploaded", "result {}: {}", index, result);
    Uuid::parse_str(result["id"].as_str().unwrap()).unwrap()
}
