//! Upload batches: per-file isolation, validation and artifact cleanup.

use ai_gallery_lib::models::ProcessingStatus;
use std::time::Duration;

use super::fakes::{ALICE_ID, ALICE_TOKEN, VisionScript};
use super::test_helpers::{
    Part, TestContext, noisy_png_bytes, png_bytes, upload, uploaded_id,
};

#[actix_rt::test]
async fn test_upload_stores_image_row_and_both_artifacts() {
    let ctx = TestContext::new();
    ctx.vision.set(VisionScript::Hang);
    let app = ctx.app().await;

    let (status, body) = upload(
        &app,
        Some(ALICE_TOKEN),
        &[Part::png("cat.png", png_bytes(640, 480, [10, 20, 30]))],
    )
    .await;

    assert_eq!(status, 200, "body: {}", body);
    let result = &body["results"][0];
    assert_eq!(result["status"], "uploaded");
    assert_eq!(result["filename"], "cat.png");
    assert_eq!(result["processing_status"], "pending");

    let id = uploaded_id(&body, 0);
    let record = ctx.store.get(id).expect("image row missing");
    assert_eq!(record.image.owner_id, ALICE_ID);
    assert_eq!(record.image.content_type, "image/png");
    assert_eq!(record.image.content_hash.len(), 64);
    assert!(record.metadata.tags.is_empty());
    assert!(record.metadata.description.is_empty());

    assert_eq!(
        ctx.artifacts.keys(),
        vec![
            format!("ai-gallery/originals/{}/{}.png", ALICE_ID, id),
            format!("ai-gallery/thumbnails/{}/{}.png", ALICE_ID, id),
        ]
    );
    assert_eq!(
        result["thumbnail_url"],
        format!("https://cdn.test/ai-gallery/thumbnails/{}/{}.png", ALICE_ID, id)
    );
}

#[actix_rt::test]
async fn test_storage_failure_only_fails_that_file() {
    let ctx = TestContext::new();
    let poisoned = png_bytes(17, 13, [200, 0, 0]);
    ctx.artifacts.fail_puts_of(&poisoned);
    let app = ctx.app().await;

    let (status, body) = upload(
        &app,
        Some(ALICE_TOKEN),
        &[
            Part::png("a.png", png_bytes(32, 32, [0, 0, 255])),
            Part::png("b.png", poisoned),
            Part::png("c.png", png_bytes(48, 24, [0, 255, 0])),
        ],
    )
    .await;

    assert_eq!(status, 200, "body: {}", body);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);

    assert_eq!(results[0]["status"], "uploaded");
    assert_eq!(results[0]["filename"], "a.png");
    assert_eq!(results[1]["status"], "failed");
    assert_eq!(results[1]["filename"], "b.png");
    assert!(
        results[1]["error"].as_str().unwrap().contains("Storage error"),
        "error: {}",
        results[1]["error"]
    );
    assert_eq!(results[2]["status"], "uploaded");
    assert_eq!(results[2]["filename"], "c.png");

    assert_eq!(ctx.store.len(), 2);
    assert_eq!(ctx.artifacts.len(), 4);
}

#[actix_rt::test]
async fn test_failed_thumbnail_write_removes_original() {
    let ctx = TestContext::new();
    ctx.artifacts.fail_puts_under("ai-gallery/thumbnails");
    let app = ctx.app().await;

    let (status, body) = upload(
        &app,
        Some(ALICE_TOKEN),
        &[Part::png("a.png", png_bytes(32, 32, [1, 2, 3]))],
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["results"][0]["status"], "failed");
    assert_eq!(ctx.artifacts.len(), 0, "orphans: {:?}", ctx.artifacts.keys());
    assert_eq!(ctx.store.len(), 0);
}

#[actix_rt::test]
async fn test_database_failure_removes_both_artifacts() {
    let ctx = TestContext::new();
    ctx.store.fail_creates();
    let app = ctx.app().await;

    let (status, body) = upload(
        &app,
        Some(ALICE_TOKEN),
        &[Part::png("a.png", png_bytes(32, 32, [1, 2, 3]))],
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["results"][0]["status"], "failed");
    assert_eq!(ctx.artifacts.len(), 0, "orphans: {:?}", ctx.artifacts.keys());
}

#[actix_rt::test]
async fn test_non_image_part_is_rejected_per_file() {
    let ctx = TestContext::new();
    let app = ctx.app().await;

    let (status, body) = upload(
        &app,
        Some(ALICE_TOKEN),
        &[
            Part::file("notes.txt", "text/plain", b"hello".to_vec()),
            Part::png("a.png", png_bytes(16, 16, [9, 9, 9])),
        ],
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["results"][0]["status"], "failed");
    assert_eq!(body["results"][0]["filename"], "notes.txt");
    assert_eq!(body["results"][0]["error"], "Only image files are allowed");
    assert_eq!(body["results"][1]["status"], "uploaded");
    assert_eq!(ctx.store.len(), 1);
}

#[actix_rt::test]
async fn test_undecodable_image_fails_without_writes() {
    let ctx = TestContext::new();
    let app = ctx.app().await;

    let (status, body) = upload(
        &app,
        Some(ALICE_TOKEN),
        &[Part::png("broken.png", b"definitely not a png".to_vec())],
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["results"][0]["status"], "failed");
    assert_eq!(ctx.artifacts.len(), 0);
    assert_eq!(ctx.store.len(), 0);
}

#[actix_rt::test]
async fn test_empty_and_oversized_files_fail() {
    let mut ctx = TestContext::new();
    ctx.upload.max_file_size = 1024;
    let app = ctx.app().await;

    let (status, body) = upload(
        &app,
        Some(ALICE_TOKEN),
        &[
            Part::png("empty.png", Vec::new()),
            Part::png("big.png", noisy_png_bytes(64, 64)),
            Part::png("small.png", png_bytes(8, 8, [4, 4, 4])),
        ],
    )
    .await;

    assert_eq!(status, 200, "body: {}", body);
    assert_eq!(body["results"][0]["error"], "File is empty");
    assert_eq!(body["results"][1]["status"], "failed");
    assert!(
        body["results"][1]["error"]
            .as_str()
            .unwrap()
            .contains("size limit")
    );
    assert_eq!(body["results"][2]["status"], "uploaded");
}

#[actix_rt::test]
async fn test_no_files_is_bad_request() {
    let ctx = TestContext::new();
    let app = ctx.app().await;

    let (status, body) = upload(&app, Some(ALICE_TOKEN), &[Part::field("just a note")]).await;

    assert_eq!(status, 400);
    assert_eq!(body["error"], "INVALID_INPUT");
    assert_eq!(ctx.store.len(), 0);
}

#[actix_rt::test]
async fn test_too_many_files_is_bad_request() {
    let mut ctx = TestContext::new();
    ctx.upload.max_files_per_request = 2;
    let app = ctx.app().await;

    let parts: Vec<Part> = (0..3)
        .map(|i| Part::png(&format!("{}.png", i), png_bytes(8, 8, [i, i, i])))
        .collect();
    let (status, body) = upload(&app, Some(ALICE_TOKEN), &parts).await;

    assert_eq!(status, 400);
    assert!(body["message"].as_str().unwrap().contains("Too many files"));
    assert_eq!(ctx.store.len(), 0);
}

#[actix_rt::test]
async fn test_upload_requires_token() {
    let ctx = TestContext::new();
    let app = ctx.app().await;

    let (status, body) = upload(
        &app,
        None,
        &[Part::png("a.png", png_bytes(8, 8, [0, 0, 0]))],
    )
    .await;

    assert_eq!(status, 401);
    assert_eq!(body["error"], "UNAUTHORIZED");
    assert_eq!(ctx.store.len(), 0);
    assert_eq!(ctx.artifacts.len(), 0);
}

#[actix_rt::test]
async fn test_full_queue_marks_image_failed_but_keeps_it() {
    let mut ctx = TestContext::new();
    ctx.vision.set(VisionScript::Hang);
    ctx.annotation.workers = 1;
    ctx.annotation.queue_capacity = 1;
    ctx.annotation.enqueue_timeout = Duration::from_millis(50);
    let app = ctx.app().await;

    let parts: Vec<Part> = (0..6u8)
        .map(|i| Part::png(&format!("{}.png", i), png_bytes(8, 8 + u32::from(i), [i, 0, 0])))
        .collect();
    let (status, body) = upload(&app, Some(ALICE_TOKEN), &parts).await;

    assert_eq!(status, 200, "body: {}", body);
    let results = body["results"].as_array().unwrap();
    assert!(results.iter().all(|r| r["status"] == "uploaded"));

    // One job running, one held by the dispatcher, one queued; the rest time out.
    let unscheduled = results
        .iter()
        .filter(|r| r["processing_status"] == "failed")
        .count();
    assert!(unscheduled >= 3, "only {} unscheduled", unscheduled);
    assert_eq!(ctx.store.len(), 6);
    assert!(ctx.store.count_with_status(ProcessingStatus::Failed) >= 3);
}
