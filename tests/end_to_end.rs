//! End-to-End Pipeline Tests
//!
//! Runs both phases through the `Pipeline` controller with in-memory
//! collaborators: convert two files, upload them, link the one that has a
//! row and ask about the one that does not.

mod common;

use std::sync::Arc;

use common::{write_sources, FakeTranscoder, MemorySheet, MemoryStorage};
use tempfile::TempDir;
use wavlink::core::{collect_sources, ChannelDecider, FixedDecision, Pipeline, PipelineError};
use wavlink::domain::{hyperlink_formula, EventKind, Phase, PhaseState, PhaseStatus, SheetTarget};

#[tokio::test]
async fn test_convert_upload_and_reconcile() {
    let temp = TempDir::new().unwrap();
    let input_dir = temp.path().join("in");
    std::fs::create_dir_all(&input_dir).unwrap();
    write_sources(&input_dir, &["b.wav", "a.wav"]);
    let out = temp.path().join("out");

    let storage = Arc::new(MemoryStorage::new());
    let sheet = Arc::new(MemorySheet::with_names(4, &["a.wav"]));
    let pipeline = Pipeline::new(Arc::new(FakeTranscoder::new()))
        .with_remote(storage.clone(), sheet.clone())
        .with_chunk_size(256);

    // Conversion phase
    let sources = collect_sources(&[input_dir.clone()], "wav").unwrap();
    let mut conversion = pipeline.start_conversion(sources, &out).await.unwrap();
    while conversion.next_event().await.is_some() {}
    let converted = conversion.join().await.unwrap();

    let outputs: Vec<_> = converted.iter().map(|c| c.output_path.clone()).collect();
    assert_eq!(outputs, vec![out.join("a.mp3"), out.join("b.mp3")]);
    assert!(converted.iter().all(|c| c.is_success()));

    // Publish phase, answering the decision from the "presentation" side
    let (decider, mut requests) = ChannelDecider::channel();
    let mut publish = pipeline
        .start_publish(
            converted,
            "folder-1",
            SheetTarget::new("doc-1", "Sheet1", 4),
            Arc::new(decider),
        )
        .unwrap();

    let mut events = Vec::new();
    let mut asked = Vec::new();
    loop {
        tokio::select! {
            event = publish.next_event() => match event {
                Some(event) => events.push(event),
                None => break,
            },
            Some(request) = requests.recv() => {
                asked.push(request.names().to_vec());
                request.resolve(false);
            }
        }
    }
    let summary = publish.join().await.unwrap();

    let uploaded: Vec<_> = summary
        .uploads
        .iter()
        .map(|u| (u.display_name.clone(), u.link().map(str::to_string)))
        .collect();
    assert_eq!(
        uploaded,
        vec![
            ("a".to_string(), Some(MemoryStorage::link_for("a.mp3"))),
            ("b".to_string(), Some(MemoryStorage::link_for("b.mp3"))),
        ]
    );

    assert_eq!(
        sheet.cell("B4"),
        Some(hyperlink_formula(&MemoryStorage::link_for("a.mp3"), "a.mp3"))
    );
    assert_eq!(asked, vec![vec!["b.wav".to_string()]]);
    assert_eq!(sheet.row_count(), 1);

    let report = summary.reconcile.unwrap().unwrap();
    assert_eq!(report.updated_rows, vec![4]);
    assert_eq!(report.unmatched, vec!["b.wav".to_string()]);
    assert!(!report.appended());

    assert!(events.iter().all(|e| e.phase == Phase::Publish));
    assert!(events
        .iter()
        .any(|e| matches!(&e.kind, EventKind::DecisionRequested { names } if names == &["b.wav"])));
    assert!(events
        .iter()
        .any(|e| matches!(&e.kind, EventKind::RowUpdated { row: 4, name } if name == "a.wav")));

    let status = PhaseStatus::from_events(&events).unwrap();
    assert_eq!(status.state, PhaseState::Completed);
    assert_eq!(status.percent(), 100.0);
}

#[tokio::test]
async fn test_publish_without_folder_fails_fast() {
    let pipeline = Pipeline::new(Arc::new(FakeTranscoder::new())).with_remote(
        Arc::new(MemoryStorage::new()),
        Arc::new(MemorySheet::default()),
    );

    let result = pipeline.start_publish(
        vec![],
        "",
        SheetTarget::new("doc-1", "Sheet1", 4),
        Arc::new(FixedDecision(false)),
    );

    assert!(matches!(result, Err(PipelineError::Configuration(_))));
}

#[tokio::test]
async fn test_publish_without_remote_clients_fails_fast() {
    let pipeline = Pipeline::new(Arc::new(FakeTranscoder::new()));

    let result = pipeline.start_publish(
        vec![],
        "folder-1",
        SheetTarget::new("doc-1", "Sheet1", 4),
        Arc::new(FixedDecision(false)),
    );

    assert!(matches!(result, Err(PipelineError::Configuration(_))));
}

#[tokio::test]
async fn test_reconcile_failure_aborts_publish_phase() {
    let temp = TempDir::new().unwrap();
    let inputs = write_sources(temp.path(), &["a.mp3"]);
    let converted = vec![wavlink::domain::ConversionResult::from_artifact(&inputs[0], "wav")];

    let sheet = Arc::new(MemorySheet::with_names(4, &["a.wav"]).failing_on_write(0));
    let pipeline = Pipeline::new(Arc::new(FakeTranscoder::new()))
        .with_remote(Arc::new(MemoryStorage::new()), sheet.clone())
        .with_chunk_size(256);

    let mut publish = pipeline
        .start_publish(
            converted,
            "folder-1",
            SheetTarget::new("doc-1", "Sheet1", 4),
            Arc::new(FixedDecision(false)),
        )
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = publish.next_event().await {
        events.push(event);
    }
    let summary = publish.join().await.unwrap();

    assert_eq!(summary.uploads.len(), 1);
    assert!(summary.uploads[0].is_success());
    assert!(matches!(
        summary.reconcile,
        Some(Err(PipelineError::DocumentWrite { .. }))
    ));
    assert!(!summary.is_clean());

    let status = PhaseStatus::from_events(&events).unwrap();
    assert!(matches!(status.state, PhaseState::Aborted { .. }));
}

#[tokio::test]
async fn test_nothing_uploaded_leaves_sheet_alone() {
    let temp = TempDir::new().unwrap();
    let inputs = write_sources(temp.path(), &["a.mp3"]);
    let converted = vec![wavlink::domain::ConversionResult::from_artifact(&inputs[0], "wav")];

    let sheet = Arc::new(MemorySheet::with_names(4, &["a.wav"]));
    let pipeline = Pipeline::new(Arc::new(FakeTranscoder::new()))
        .with_remote(Arc::new(MemoryStorage::failing(&["a.mp3"])), sheet.clone());

    let mut publish = pipeline
        .start_publish(
            converted,
            "folder-1",
            SheetTarget::new("doc-1", "Sheet1", 4),
            Arc::new(FixedDecision(true)),
        )
        .unwrap();
    while publish.next_event().await.is_some() {}
    let summary = publish.join().await.unwrap();

    assert_eq!(summary.failed_uploads(), 1);
    assert!(summary.reconcile.is_none());
    assert!(sheet.writes().is_empty());
}
