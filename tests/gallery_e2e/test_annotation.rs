//! Background annotation: status machine, failure modes, events, the
//! sweeper and the HTTP vision client.

use ai_gallery_lib::config::{AnnotationSettings, VisionSettings};
use ai_gallery_lib::db::{GalleryStore, StatusUpdate};
use ai_gallery_lib::error::AppError;
use ai_gallery_lib::models::{Annotation, ProcessingStatus};
use ai_gallery_lib::services::sweeper::sweep_once;
use ai_gallery_lib::services::{
    AnnotationJob, AnnotationQueue, OpenAiVision, SweeperConfig, VisionModel,
};
use chrono::Utc;
use secrecy::SecretString;
use serde_json::json;
use std::time::Duration;

use super::fakes::{
    ALICE_ID, ALICE_TOKEN, GOOD_REPLY, VisionScript, completed_record, pending_record,
};
use super::mock_vision_provider::{MockReply, MockVisionProvider};
use super::test_helpers::{Part, TestContext, get_json, png_bytes, upload, uploaded_id};

fn job_for(image_id: uuid::Uuid) -> AnnotationJob {
    AnnotationJob {
        image_id,
        image_url: format!("https://cdn.test/{}.png", image_id),
    }
}

#[actix_rt::test]
async fn test_uploaded_image_gets_annotated() {
    let ctx = TestContext::new();
    let app = ctx.app().await;

    let (_, body) = upload(
        &app,
        Some(ALICE_TOKEN),
        &[Part::png("dog.png", png_bytes(64, 64, [0, 200, 0]))],
    )
    .await;
    let id = uploaded_id(&body, 0);

    ctx.wait_for_status(id, ProcessingStatus::Completed).await;

    let (status, body) = get_json(&app, Some(ALICE_TOKEN), &format!("/images/{}", id)).await;
    assert_eq!(status, 200);
    let metadata = &body["image"]["metadata"];
    assert_eq!(metadata["status"], "completed");
    assert_eq!(metadata["tags"], json!(["dog", "park", "grass"]));
    assert_eq!(metadata["description"], "A dog running across a park.");
    assert_eq!(metadata["colors"], json!(["#00FF00", "#8B4513", "#FFFFFF"]));
    assert_eq!(ctx.vision.calls(), 1);

    // Annotated images become searchable
    let (_, body) = get_json(&app, Some(ALICE_TOKEN), "/search/text?q=park").await;
    assert_eq!(body["pagination"]["total"], 1);
}

#[actix_rt::test]
async fn test_unparseable_reply_fails_and_leaves_fields_empty() {
    let ctx = TestContext::new();
    ctx.vision
        .set(VisionScript::Reply("I see a lovely dog.".to_string()));
    let id = ctx.store.insert(pending_record(ALICE_ID, Utc::now()));

    let outcome = ctx.annotator().annotate(job_for(id)).await.unwrap();

    assert_eq!(outcome, Some(ProcessingStatus::Failed));
    let record = ctx.store.get(id).unwrap();
    assert_eq!(record.metadata.status, ProcessingStatus::Failed);
    assert!(record.metadata.tags.is_empty());
    assert!(record.metadata.colors.is_empty());
    assert!(record.metadata.description.is_empty());
}

#[actix_rt::test]
async fn test_decorated_reply_keeps_tags_and_usable_colors() {
    let ctx = TestContext::new();
    ctx.vision.set(VisionScript::Reply(
        "Here you go:\n**TAGS:** sky, clouds\n**DESCRIPTION:** Clouds over a hill.\n**COLORS:** #87CEEB (sky blue), white"
            .to_string(),
    ));
    let id = ctx.store.insert(pending_record(ALICE_ID, Utc::now()));

    let outcome = ctx.annotator().annotate(job_for(id)).await.unwrap();
    assert_eq!(outcome, Some(ProcessingStatus::Completed));

    let record = ctx.store.get(id).unwrap();
    assert_eq!(record.metadata.tags, vec!["sky", "clouds"]);
    assert_eq!(record.metadata.description, "Clouds over a hill.");
    assert_eq!(record.metadata.colors, vec!["#87CEEB"]);
}

#[actix_rt::test]
async fn test_vision_error_marks_failed() {
    let ctx = TestContext::new();
    ctx.vision
        .set(VisionScript::Fail("vision model returned 500".to_string()));
    let id = ctx.store.insert(pending_record(ALICE_ID, Utc::now()));

    let outcome = ctx.annotator().annotate(job_for(id)).await.unwrap();

    assert_eq!(outcome, Some(ProcessingStatus::Failed));
    assert_eq!(ctx.store.status_of(id), Some(ProcessingStatus::Failed));
}

#[actix_rt::test]
async fn test_vision_timeout_marks_failed() {
    let mut ctx = TestContext::new();
    ctx.vision.set(VisionScript::Hang);
    ctx.vision_timeout = Duration::from_millis(50);
    let id = ctx.store.insert(pending_record(ALICE_ID, Utc::now()));

    let outcome = ctx.annotator().annotate(job_for(id)).await.unwrap();

    assert_eq!(outcome, Some(ProcessingStatus::Failed));
    assert_eq!(ctx.store.status_of(id), Some(ProcessingStatus::Failed));
}

#[actix_rt::test]
async fn test_annotator_skips_image_that_is_not_pending() {
    let ctx = TestContext::new();
    let id = ctx.store.insert(completed_record(
        ALICE_ID,
        &["kept"],
        &["#111111"],
        "Already done",
        Utc::now(),
    ));

    let outcome = ctx.annotator().annotate(job_for(id)).await.unwrap();

    assert_eq!(outcome, None);
    assert_eq!(ctx.vision.calls(), 0);
    let record = ctx.store.get(id).unwrap();
    assert_eq!(record.metadata.tags, vec!["kept".to_string()]);
}

#[actix_rt::test]
async fn test_annotator_skips_deleted_image() {
    let ctx = TestContext::new();
    let outcome = ctx
        .annotator()
        .annotate(job_for(uuid::Uuid::now_v7()))
        .await
        .unwrap();
    assert_eq!(outcome, None);
    assert_eq!(ctx.vision.calls(), 0);
}

#[actix_rt::test]
async fn test_status_never_moves_backwards() {
    let ctx = TestContext::new();
    let id = ctx.store.insert(pending_record(ALICE_ID, Utc::now()));
    let store: &dyn GalleryStore = ctx.store.as_ref();

    // pending cannot jump to completed
    let annotation = Annotation {
        tags: vec!["x".to_string()],
        description: "x".to_string(),
        colors: Vec::new(),
    };
    assert!(
        !store
            .advance_status(id, StatusUpdate::Completed(annotation.clone()))
            .await
            .unwrap()
    );

    assert!(store.advance_status(id, StatusUpdate::Processing).await.unwrap());
    assert!(!store.advance_status(id, StatusUpdate::Processing).await.unwrap());
    assert!(store.advance_status(id, StatusUpdate::Failed).await.unwrap());

    // failed is terminal
    assert!(!store.advance_status(id, StatusUpdate::Processing).await.unwrap());
    assert!(
        !store
            .advance_status(id, StatusUpdate::Completed(annotation))
            .await
            .unwrap()
    );
    assert_eq!(ctx.store.status_of(id), Some(ProcessingStatus::Failed));
}

#[actix_rt::test]
async fn test_events_report_outcomes() {
    let ctx = TestContext::new();
    let mut events = ctx.events.subscribe();

    let ok = ctx.store.insert(pending_record(ALICE_ID, Utc::now()));
    ctx.annotator().annotate(job_for(ok)).await.unwrap();

    ctx.vision.set(VisionScript::Reply("nonsense".to_string()));
    let bad = ctx.store.insert(pending_record(ALICE_ID, Utc::now()));
    ctx.annotator().annotate(job_for(bad)).await.unwrap();

    let first = events.recv().await.unwrap();
    assert_eq!(first.image_id, ok);
    assert_eq!(first.status, ProcessingStatus::Completed);
    assert!(first.error.is_none());

    let second = events.recv().await.unwrap();
    assert_eq!(second.image_id, bad);
    assert_eq!(second.status, ProcessingStatus::Failed);
    assert!(
        second
            .error
            .as_deref()
            .unwrap()
            .contains("unparseable model reply")
    );
}

#[actix_rt::test]
async fn test_full_queue_rejects_enqueue() {
    let ctx = TestContext::new();
    ctx.vision.set(VisionScript::Hang);
    let settings = AnnotationSettings {
        workers: 1,
        queue_capacity: 1,
        enqueue_timeout: Duration::from_millis(20),
        ..AnnotationSettings::default()
    };
    let queue = AnnotationQueue::start(ctx.annotator(), &settings);

    let mut rejected = 0;
    for _ in 0..5 {
        let id = ctx.store.insert(pending_record(ALICE_ID, Utc::now()));
        match queue.enqueue(job_for(id)).await {
            Ok(()) => {}
            Err(AppError::ServiceUnavailable(message)) => {
                assert!(message.contains("annotation queue full"), "{}", message);
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert!(rejected >= 2, "only {} rejected", rejected);
}

#[actix_rt::test]
async fn test_sweeper_fails_only_stale_rows() {
    let ctx = TestContext::new();
    let stale = ctx
        .store
        .insert(pending_record(ALICE_ID, Utc::now() - chrono::Duration::hours(3)));
    let fresh = ctx.store.insert(pending_record(ALICE_ID, Utc::now()));
    let done = ctx.store.insert(completed_record(
        ALICE_ID,
        &["old"],
        &[],
        "Old but finished",
        Utc::now() - chrono::Duration::days(2),
    ));

    let config = SweeperConfig {
        stale_after: Duration::from_secs(7200),
        interval: Duration::from_secs(60),
        started_at: Utc::now(),
    };
    let failed = sweep_once(ctx.store.as_ref(), &config).await.unwrap();

    assert_eq!(failed, 1);
    assert_eq!(ctx.store.status_of(stale), Some(ProcessingStatus::Failed));
    assert_eq!(ctx.store.status_of(fresh), Some(ProcessingStatus::Pending));
    assert_eq!(ctx.store.status_of(done), Some(ProcessingStatus::Completed));
}

#[actix_rt::test]
async fn test_sweeper_leaves_jobs_waiting_in_live_queue() {
    let ctx = TestContext {
        vision_timeout: Duration::from_millis(300),
        ..TestContext::new()
    };
    ctx.vision.set(VisionScript::Hang);
    let config = SweeperConfig {
        stale_after: Duration::from_millis(100),
        interval: Duration::from_secs(60),
        started_at: Utc::now(),
    };
    let settings = AnnotationSettings {
        workers: 1,
        ..AnnotationSettings::default()
    };
    let queue = AnnotationQueue::start(ctx.annotator(), &settings);

    let leftover = ctx
        .store
        .insert(pending_record(ALICE_ID, Utc::now() - chrono::Duration::hours(1)));
    let blocking = ctx.store.insert(pending_record(ALICE_ID, Utc::now()));
    let waiting = ctx.store.insert(pending_record(ALICE_ID, Utc::now()));
    queue.enqueue(job_for(blocking)).await.unwrap();
    queue.enqueue(job_for(waiting)).await.unwrap();

    // The waiting row is older than the stale threshold but was written
    // by this process, so only the leftover from before start-up goes
    tokio::time::sleep(Duration::from_millis(200)).await;
    let failed = sweep_once(ctx.store.as_ref(), &config).await.unwrap();
    assert_eq!(failed, 1);
    assert_eq!(ctx.store.status_of(leftover), Some(ProcessingStatus::Failed));
    assert_eq!(ctx.store.status_of(waiting), Some(ProcessingStatus::Pending));

    ctx.vision.set(VisionScript::Reply(GOOD_REPLY.to_string()));
    ctx.wait_for_status(blocking, ProcessingStatus::Failed).await;
    ctx.wait_for_status(waiting, ProcessingStatus::Completed).await;
}

fn vision_settings(endpoint: &str) -> VisionSettings {
    VisionSettings {
        endpoint: endpoint.to_string(),
        api_key: Some(SecretString::from("sk-test".to_string())),
        model: "gpt-4-turbo".to_string(),
        max_tokens: 300,
        timeout: Duration::from_secs(5),
    }
}

#[actix_rt::test]
async fn test_vision_client_sends_prompt_and_image_url() {
    let mock = MockVisionProvider::start(MockReply::Content(
        "TAGS: cat DESCRIPTION: A cat. COLORS: #000".to_string(),
    ))
    .await;
    let vision = OpenAiVision::new(&vision_settings(&mock.endpoint)).unwrap();

    let reply = vision
        .describe("https://cdn.test/ai-gallery/originals/u/1.png")
        .await
        .unwrap();
    assert_eq!(reply, "TAGS: cat DESCRIPTION: A cat. COLORS: #000");

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer sk-test"));

    let body = &requests[0].body;
    assert_eq!(body["model"], "gpt-4-turbo");
    assert_eq!(body["max_tokens"], 300);
    let content = &body["messages"][0]["content"];
    assert_eq!(content[0]["type"], "text");
    assert!(content[0]["text"].as_str().unwrap().starts_with("Analyze this image"));
    assert_eq!(content[1]["type"], "image_url");
    assert_eq!(
        content[1]["image_url"]["url"],
        "https://cdn.test/ai-gallery/originals/u/1.png"
    );
}

#[actix_rt::test]
async fn test_vision_client_surfaces_http_errors() {
    let mock = MockVisionProvider::start(MockReply::Status(
        429,
        "rate limited".to_string(),
    ))
    .await;
    let vision = OpenAiVision::new(&vision_settings(&mock.endpoint)).unwrap();

    let err = vision.describe("https://cdn.test/x.png").await.unwrap_err();
    match err {
        AppError::Upstream(message) => {
            assert!(message.contains("429"), "{}", message);
            assert!(message.contains("rate limited"), "{}", message);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[actix_rt::test]
async fn test_vision_client_rejects_empty_content() {
    let mock = MockVisionProvider::start(MockReply::Content("   ".to_string())).await;
    let vision = OpenAiVision::new(&vision_settings(&mock.endpoint)).unwrap();

    let err = vision.describe("https://cdn.test/x.png").await.unwrap_err();
    assert!(matches!(err, AppError::Upstream(_)));
}
