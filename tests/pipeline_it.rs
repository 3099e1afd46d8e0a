//! End-to-end pipeline scenarios over in-memory collaborators.

mod common;

use catalog_ingest::ai::Enhancement;
use catalog_ingest::commit::CommitError;
use catalog_ingest::model::{DraftStatus, ImportSource};
use catalog_ingest::pipeline::{IngestError, PipelineState, SaveOutcome, StartOutcome};
use common::{analysis, multi_detect, photo, poor_analysis, spreadsheet, TestHarness, BUSINESS};

#[tokio::test]
async fn single_photo_happy_path() {
    let mut h = TestHarness::new();
    h.vision.set_analysis(analysis("Taladro Bosch 500W", 0.92));

    let outcome = h.pipeline.start(vec![photo("taladro.jpg")]).await.unwrap();
    assert!(matches!(outcome, StartOutcome::Interactive));
    // Good confidence, single product: straight to review.
    assert!(matches!(h.pipeline.state(), PipelineState::Review));

    let draft = h.pipeline.draft();
    assert_eq!(draft.title, "Taladro Bosch 500W");
    assert_eq!(draft.price, Some(25.0));
    assert_eq!(draft.currency.as_deref(), Some("PEN"));
    assert_eq!(draft.import_source, ImportSource::ManualPhoto);
    assert_eq!(draft.ai_confidence, Some(0.92));

    let saved = h.pipeline.save(DraftStatus::Published).await.unwrap();
    let ids = match saved {
        SaveOutcome::Committed(ids) => ids,
        other => panic!("expected committed, got {:?}", other),
    };
    assert_eq!(ids.len(), 1);

    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "Taladro Bosch 500W");
    assert_eq!(records[0].status, DraftStatus::Published);
    assert_eq!(records[0].business_id, BUSINESS);
}

#[tokio::test]
async fn optimized_image_supersedes_the_upload() {
    let mut h = TestHarness::new();
    h.vision.set_analysis(analysis("Taladro", 0.9));

    h.pipeline.start(vec![photo("taladro.jpg")]).await.unwrap();

    // The engine produced an optimized variant; it becomes the draft
    // image while the raw upload stays resolvable as the original.
    let draft_url = h.pipeline.draft().image_url.clone().unwrap();
    assert!(draft_url.contains("optimize"));
    let original = h.pipeline.original_asset().unwrap();
    assert!(original.url.starts_with("mem://assets/"));
    assert!(h.storage.contains(&original.url));
}

#[tokio::test]
async fn poor_photo_routes_through_quality_tip() {
    let mut h = TestHarness::new();
    h.vision.set_analysis(poor_analysis("Arroz Costeño"));

    h.pipeline.start(vec![photo("arroz.jpg")]).await.unwrap();

    let tips = match h.pipeline.state() {
        PipelineState::QualityTip { tips } => tips.clone(),
        other => panic!("expected quality tip, got {}", other.name()),
    };
    assert_eq!(tips.len(), 2);

    h.pipeline.continue_anyway().unwrap();
    assert!(matches!(h.pipeline.state(), PipelineState::Review));
    assert_eq!(h.pipeline.draft().title, "Arroz Costeño");
}

#[tokio::test]
async fn multi_product_photo_splits_into_drafts() {
    let mut h = TestHarness::new();
    h.vision.set_analysis(analysis("Canasta", 0.8));
    h.vision
        .set_multi(multi_detect(&["Arroz", "Aceite", "Azúcar"]));

    h.pipeline.start(vec![photo("canasta.jpg")]).await.unwrap();
    assert!(matches!(
        h.pipeline.state(),
        PipelineState::MultiProductDetected { .. }
    ));

    let outcome = h.pipeline.save_separately().await.unwrap();
    assert_eq!(outcome.succeeded.len(), 3);
    assert!(outcome.failed.is_empty());
    assert!(matches!(
        h.pipeline.state(),
        PipelineState::Committed { .. }
    ));

    let records = h.store.records();
    assert_eq!(records.len(), 3);
    let image = records[0].image_url.clone();
    for record in &records {
        // Splits are never auto-published and share the source photo.
        assert_eq!(record.status, DraftStatus::Draft);
        assert_eq!(record.import_source, ImportSource::ManualPhotoMulti);
        assert_eq!(record.ai_confidence, Some(0.7));
        assert_eq!(record.image_url, image);
    }
}

#[tokio::test]
async fn treat_as_one_keeps_the_single_analysis() {
    let mut h = TestHarness::new();
    h.vision.set_analysis(analysis("Pack de aceites", 0.85));
    h.vision.set_multi(multi_detect(&["Aceite A", "Aceite B"]));

    h.pipeline.start(vec![photo("pack.jpg")]).await.unwrap();
    h.pipeline.treat_as_one().unwrap();

    assert!(matches!(h.pipeline.state(), PipelineState::Review));
    assert_eq!(h.pipeline.draft().title, "Pack de aceites");
}

#[tokio::test]
async fn batch_session_walks_every_item() {
    let mut h = TestHarness::new();
    h.vision.queue_analysis(analysis("Producto Uno", 0.9));
    h.vision.queue_analysis(analysis("Producto Dos", 0.9));
    h.vision.queue_analysis(analysis("Producto Tres", 0.9));

    h.pipeline
        .start(vec![photo("a.jpg"), photo("b.jpg"), photo("c.jpg")])
        .await
        .unwrap();

    // First item is already analyzed.
    assert!(matches!(h.pipeline.state(), PipelineState::Review));
    assert_eq!(h.pipeline.draft().title, "Producto Uno");

    let first = h.pipeline.save(DraftStatus::Published).await.unwrap();
    match first {
        SaveOutcome::NextInBatch { saved, remaining } => {
            assert_eq!(saved, 1);
            assert_eq!(remaining, 2);
        }
        other => panic!("expected next in batch, got {:?}", other),
    }
    assert_eq!(h.pipeline.draft().title, "Producto Dos");

    h.pipeline.save(DraftStatus::Published).await.unwrap();
    assert_eq!(h.pipeline.batch_saved_count(), 2);
    assert_eq!(h.pipeline.draft().title, "Producto Tres");

    let last = h.pipeline.save(DraftStatus::Published).await.unwrap();
    let ids = match last {
        SaveOutcome::Committed(ids) => ids,
        other => panic!("expected committed, got {:?}", other),
    };
    assert_eq!(ids.len(), 3);
    assert_eq!(h.store.records().len(), 3);
    assert_eq!(h.storage.object_count(), 3);
}

#[tokio::test]
async fn terminal_commit_releases_the_session() {
    let mut h = TestHarness::new();
    h.vision.set_analysis(analysis("Taladro Bosch 500W", 0.9));
    h.pipeline.start(vec![photo("taladro.jpg")]).await.unwrap();
    h.pipeline.save(DraftStatus::Published).await.unwrap();
    assert!(matches!(
        h.pipeline.state(),
        PipelineState::Committed { .. }
    ));

    // Nothing survives the commit: no history to walk back into, no
    // draft that could be written a second time.
    assert!(matches!(
        h.pipeline.back().unwrap_err(),
        IngestError::InvalidTransition { .. }
    ));
    assert!(h.pipeline.draft().title.is_empty());
    assert!(h.pipeline.original_asset().is_none());
    assert_eq!(h.store.records().len(), 1);
}

#[tokio::test]
async fn mid_batch_failure_ends_the_session_without_skipping_items() {
    let mut h = TestHarness::new();
    h.vision.queue_analysis(analysis("Producto Uno", 0.9));
    h.pipeline
        .start(vec![photo("a.jpg"), photo("b.jpg"), photo("c.jpg")])
        .await
        .unwrap();
    assert_eq!(h.pipeline.draft().title, "Producto Uno");

    // The first item commits, then the broker dies before the second
    // item can be uploaded.
    h.storage
        .fail_with(catalog_ingest::storage::StorageErrorKind::Network);
    let outcome = h.pipeline.save(DraftStatus::Published).await.unwrap();
    match outcome {
        SaveOutcome::BatchInterrupted {
            committed, dropped, ..
        } => {
            assert_eq!(committed.len(), 1);
            assert_eq!(dropped, 2);
        }
        other => panic!("expected interrupted batch, got {:?}", other),
    }
    assert!(matches!(
        h.pipeline.state(),
        PipelineState::Committed { .. }
    ));
    assert_eq!(h.store.records().len(), 1);

    // A fresh session ingests its own photo and nothing from the dead
    // queue.
    h.storage.clear_failure();
    h.pipeline.close().unwrap();
    h.vision.set_analysis(analysis("Llave Stilson 12", 0.9));
    h.pipeline.start(vec![photo("d.jpg")]).await.unwrap();
    let saved = h.pipeline.save(DraftStatus::Published).await.unwrap();
    match saved {
        SaveOutcome::Committed(ids) => assert_eq!(ids.len(), 1),
        other => panic!("expected committed, got {:?}", other),
    }
    let titles: Vec<_> = h.store.records().iter().map(|r| r.title.clone()).collect();
    assert_eq!(titles, vec!["Producto Uno", "Llave Stilson 12"]);
}

#[tokio::test]
async fn abandoned_batch_does_not_leak_into_a_new_session() {
    let mut h = TestHarness::new();
    h.vision.queue_analysis(analysis("Producto Uno", 0.9));
    h.vision.queue_analysis(analysis("Producto Dos", 0.9));
    h.pipeline
        .start(vec![photo("a.jpg"), photo("b.jpg")])
        .await
        .unwrap();
    h.pipeline.save(DraftStatus::Published).await.unwrap();
    assert_eq!(h.pipeline.draft().title, "Producto Dos");

    // Walk away from the queue instead of saving the second item.
    h.pipeline.back().unwrap();
    assert!(matches!(h.pipeline.state(), PipelineState::Choose));

    h.vision.set_analysis(analysis("Llave Stilson", 0.9));
    h.pipeline.start(vec![photo("c.jpg")]).await.unwrap();
    let saved = h.pipeline.save(DraftStatus::Published).await.unwrap();
    match saved {
        SaveOutcome::Committed(ids) => assert_eq!(ids.len(), 1),
        other => panic!("expected committed, got {:?}", other),
    }
    assert_eq!(h.pipeline.batch_saved_count(), 0);
    assert_eq!(h.store.records().len(), 2);
}

#[tokio::test]
async fn duplicate_gate_parks_the_save() {
    let mut h = TestHarness::new();
    h.vision.set_analysis(analysis("Taladro Bosch 500W", 0.9));

    // Seed an existing near-identical record.
    h.pipeline.start(vec![photo("first.jpg")]).await.unwrap();
    h.pipeline.save(DraftStatus::Published).await.unwrap();
    assert_eq!(h.store.records().len(), 1);

    h.pipeline.close().unwrap();
    h.vision.set_analysis(analysis("Taladro Bosch 500", 0.9));
    h.pipeline.start(vec![photo("second.jpg")]).await.unwrap();

    let outcome = h.pipeline.save(DraftStatus::Published).await.unwrap();
    let found = match outcome {
        SaveOutcome::DuplicatesFound(found) => found,
        other => panic!("expected duplicates, got {:?}", other),
    };
    assert_eq!(found, 1);
    assert!(matches!(
        h.pipeline.state(),
        PipelineState::DuplicateCheck { .. }
    ));
    // Nothing was written.
    assert_eq!(h.store.records().len(), 1);

    // The gate is advisory: the merchant can push through.
    let saved = h.pipeline.save_anyway().await.unwrap();
    assert!(matches!(saved, SaveOutcome::Committed(_)));
    assert_eq!(h.store.records().len(), 2);
}

#[tokio::test]
async fn duplicate_gate_allows_backing_out_to_edit() {
    let mut h = TestHarness::new();
    h.vision.set_analysis(analysis("Aceite Primor", 0.9));

    h.pipeline.start(vec![photo("first.jpg")]).await.unwrap();
    h.pipeline.save(DraftStatus::Published).await.unwrap();
    h.pipeline.close().unwrap();

    h.pipeline.start(vec![photo("second.jpg")]).await.unwrap();
    h.pipeline.save(DraftStatus::Published).await.unwrap();
    assert!(matches!(
        h.pipeline.state(),
        PipelineState::DuplicateCheck { .. }
    ));

    h.pipeline.edit_instead().unwrap();
    assert!(matches!(h.pipeline.state(), PipelineState::Review));
    h.pipeline.draft_mut().unwrap().title = "Aceite Primor Premium 1L".to_string();
    // Draft edits survived the detour.
    assert_eq!(h.pipeline.draft().title, "Aceite Primor Premium 1L");
}

#[tokio::test]
async fn enhancement_chain_is_non_destructive() {
    let mut h = TestHarness::new();
    h.vision.set_analysis(analysis("Zapatillas", 0.9));

    h.pipeline.start(vec![photo("zapas.jpg")]).await.unwrap();
    let original = h.pipeline.original_asset().unwrap().url.clone();

    h.pipeline.enhance(Enhancement::RemoveBg).await.unwrap();
    let after_bg = h.pipeline.draft().image_url.clone().unwrap();
    assert!(after_bg.contains("remove_bg"));

    h.pipeline.enhance(Enhancement::Upscale).await.unwrap();
    let after_up = h.pipeline.draft().image_url.clone().unwrap();
    assert!(after_up.contains("upscale"));
    assert_ne!(after_bg, after_up);

    // The root upload never changed and can be restored.
    assert_eq!(h.pipeline.original_asset().unwrap().url, original);
    h.pipeline.revert_image().unwrap();
    assert_eq!(h.pipeline.draft().image_url.as_deref(), Some(original.as_str()));
}

#[tokio::test]
async fn empty_title_save_is_rejected_without_a_write() {
    let mut h = TestHarness::new();
    h.pipeline.start_manual().unwrap();
    h.pipeline.draft_mut().unwrap().price = Some(10.0);

    let err = h.pipeline.save(DraftStatus::Published).await.unwrap_err();
    assert!(matches!(err, IngestError::Commit(CommitError::EmptyTitle)));
    assert!(h.store.records().is_empty());
    // Still editable, nothing was lost.
    assert!(matches!(h.pipeline.state(), PipelineState::ManualEntry));
    assert_eq!(h.pipeline.draft().price, Some(10.0));
}

#[tokio::test]
async fn total_ai_failure_degrades_to_manual_review() {
    let mut h = TestHarness::new();
    h.vision.fail_all(true);
    h.engine.fail_all(true);

    h.pipeline.start(vec![photo("borrosa.jpg")]).await.unwrap();

    // The photo made it to storage; extraction just has nothing to say.
    assert!(matches!(h.pipeline.state(), PipelineState::Review));
    let draft = h.pipeline.draft();
    assert!(draft.image_url.is_some());
    assert!(draft.title.is_empty());
    assert_eq!(h.storage.object_count(), 1);
}

#[tokio::test]
async fn upload_failure_restores_choose() {
    let mut h = TestHarness::new();
    h.storage
        .fail_with(catalog_ingest::storage::StorageErrorKind::Network);

    let err = h.pipeline.start(vec![photo("foto.jpg")]).await.unwrap_err();
    assert!(matches!(err, IngestError::TransientIo(_)));
    assert!(matches!(h.pipeline.state(), PipelineState::Choose));

    // The session is reusable once the broker recovers.
    h.storage.clear_failure();
    h.vision.set_analysis(analysis("Recuperado", 0.9));
    h.pipeline.start(vec![photo("foto.jpg")]).await.unwrap();
    assert!(matches!(h.pipeline.state(), PipelineState::Review));
}

#[tokio::test]
async fn failed_commit_returns_to_review_with_draft_intact() {
    let mut h = TestHarness::new();
    h.vision.set_analysis(analysis("Taladro", 0.9));
    h.pipeline.start(vec![photo("taladro.jpg")]).await.unwrap();

    h.store.fail_writes(true);
    let err = h.pipeline.save(DraftStatus::Published).await.unwrap_err();
    assert!(matches!(err, IngestError::Commit(CommitError::Store(_))));
    assert!(matches!(h.pipeline.state(), PipelineState::Review));
    assert_eq!(h.pipeline.draft().title, "Taladro");

    // Retry after the store recovers.
    h.store.fail_writes(false);
    let saved = h.pipeline.save(DraftStatus::Published).await.unwrap();
    assert!(matches!(saved, SaveOutcome::Committed(_)));
}

#[tokio::test]
async fn back_navigation_pops_history_without_replays() {
    let mut h = TestHarness::new();
    h.vision.set_analysis(analysis("Taladro", 0.9));
    h.pipeline.start(vec![photo("taladro.jpg")]).await.unwrap();
    assert!(matches!(h.pipeline.state(), PipelineState::Review));

    h.pipeline.back().unwrap();
    assert!(matches!(h.pipeline.state(), PipelineState::Choose));
    // No further history.
    assert!(h.pipeline.back().is_err());
    // The upload was not undone by navigating.
    assert_eq!(h.storage.object_count(), 1);
}

#[tokio::test]
async fn operations_outside_their_state_are_rejected() {
    let mut h = TestHarness::new();

    assert!(matches!(
        h.pipeline.continue_anyway().unwrap_err(),
        IngestError::InvalidTransition { .. }
    ));
    assert!(matches!(
        h.pipeline.save(DraftStatus::Published).await.unwrap_err(),
        IngestError::InvalidTransition { .. }
    ));
    assert!(matches!(
        h.pipeline.save_separately().await.unwrap_err(),
        IngestError::InvalidTransition { .. }
    ));
}

#[tokio::test]
async fn unconfigured_bulk_import_fails_cleanly() {
    let mut h = TestHarness::new();
    let err = h
        .pipeline
        .start(vec![spreadsheet("catalogo.xlsx")])
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Bulk(_)));
    assert!(matches!(h.pipeline.state(), PipelineState::Choose));
}

#[tokio::test]
async fn dirty_session_is_reported() {
    let mut h = TestHarness::new();
    assert!(!h.pipeline.is_dirty());

    h.vision.set_analysis(analysis("Taladro", 0.9));
    h.pipeline.start(vec![photo("taladro.jpg")]).await.unwrap();
    assert!(h.pipeline.is_dirty());

    h.pipeline.save(DraftStatus::Published).await.unwrap();
    // Terminal session has nothing left to lose.
    assert!(!h.pipeline.is_dirty());
}
