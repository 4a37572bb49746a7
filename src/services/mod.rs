//! Business logic services.

pub mod annotation;
pub mod events;
pub mod gallery;
pub mod ingestion;
pub mod storage;
pub mod sweeper;
pub mod thumbnail;
pub mod vision;

pub use annotation::{AnnotationJob, AnnotationQueue, Annotator};
pub use events::{AnnotationEvent, AnnotationEvents, start_event_log_task};
pub use gallery::GalleryService;
pub use ingestion::{IngestionService, UploadedFile};
pub use storage::{ArtifactFolders, ArtifactStore, Storage, StoredArtifact};
pub use sweeper::{SweeperConfig, start_sweeper_task};
pub use vision::{OpenAiVision, VisionModel};
