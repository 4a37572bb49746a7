//! AI Gallery Server - Main entry point.
//!
//! Starts the Actix-web server with configured routes, middleware and the
//! background annotation workers.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, web};
use tokio::sync::Semaphore;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use ai_gallery_lib::api::{self, ApiDoc};
use ai_gallery_lib::auth::{HostedAuthClient, IdentityProvider};
use ai_gallery_lib::config::Config;
use ai_gallery_lib::db::{DbPool, GalleryStore};
use ai_gallery_lib::middleware::{RequestLogger, REQUEST_ID_HEADER};
use ai_gallery_lib::services::{
    AnnotationEvents, AnnotationQueue, Annotator, ArtifactFolders, ArtifactStore, GalleryService,
    IngestionService, OpenAiVision, Storage, SweeperConfig, VisionModel, start_event_log_task,
    start_sweeper_task,
};

/// Perform health check (for Docker healthcheck).
fn health_check() -> bool {
    // Simple check - just verify we can load config
    Config::from_env().is_ok()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    if std::env::args().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        std::process::exit(if health_check() { 0 } else { 1 });
    }

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL, S3_*, VISION_API_KEY and AUTH_URL must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  AI Gallery Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    // Database
    let pool = DbPool::new(&config.database)
        .await
        .expect("Failed to connect to database");
    info!("Database connection established");
    pool.run_migrations()
        .await
        .expect("Failed to run migrations");
    let store: Arc<dyn GalleryStore> = Arc::new(pool);

    // Object storage
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(
        Storage::new(&config.storage)
            .await
            .expect("Failed to initialize S3 storage"),
    );

    // External collaborators
    let vision: Arc<dyn VisionModel> =
        Arc::new(OpenAiVision::new(&config.vision).expect("Failed to build vision client"));
    let identity: Arc<dyn IdentityProvider> =
        Arc::new(HostedAuthClient::new(&config.auth).expect("Failed to build auth client"));

    // Annotation pipeline
    let events = AnnotationEvents::new();
    start_event_log_task(&events);
    let annotator = Annotator::new(
        store.clone(),
        vision,
        config.vision.timeout,
        events,
    );
    let queue = AnnotationQueue::start(annotator, &config.annotation);
    start_sweeper_task(store.clone(), SweeperConfig::from(&config.annotation));

    let ingestion = IngestionService::new(
        store.clone(),
        artifacts.clone(),
        queue,
        ArtifactFolders::from_settings(&config.storage),
    );
    let gallery = GalleryService::new(store.clone(), artifacts);

    // Create upload semaphore to limit concurrent uploads
    // This bounds memory usage: max_concurrent_uploads × max_files_per_request × max_file_size
    let upload = config.upload.clone();
    let upload_semaphore = Arc::new(Semaphore::new(upload.max_concurrent_uploads));
    info!(
        "Upload limits: {}MB per file, {} files per request, {} concurrent uploads",
        upload.max_file_size / 1024 / 1024,
        upload.max_files_per_request,
        upload.max_concurrent_uploads
    );

    let bind_address = config.bind_address();
    let is_development = config.is_development();

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!("Starting server at http://{} ({} workers)", bind_address, cpus);
        cpus
    };
    info!("Swagger UI at http://{}/swagger-ui/", bind_address);

    let store_data = web::Data::from(store);
    let identity_data = web::Data::from(identity);
    let ingestion_data = web::Data::new(ingestion);
    let gallery_data = web::Data::new(gallery);
    let upload_data = web::Data::new(upload);
    let semaphore_data = web::Data::new(upload_semaphore);

    let server = HttpServer::new(move || {
        // Configure CORS
        let cors = if is_development {
            // Permissive CORS for development
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
                .expose_headers(vec![REQUEST_ID_HEADER])
                .max_age(3600)
        } else {
            // Restrictive CORS for production (same-origin only)
            Cors::default()
                .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
                .max_age(3600)
        };

        App::new()
            // Add CORS middleware (must be before other middleware)
            .wrap(cors)
            .wrap(RequestLogger)
            .app_data(store_data.clone())
            .app_data(identity_data.clone())
            .app_data(ingestion_data.clone())
            .app_data(gallery_data.clone())
            .app_data(upload_data.clone())
            .app_data(semaphore_data.clone())
            .service(web::scope("/api/v1").configure(api::configure))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    });

    server.workers(worker_count).bind(&bind_address)?.run().await
}
