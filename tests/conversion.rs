//! Conversion Phase Integration Tests
//!
//! Tests for sequential batch conversion, progress reporting and the
//! conversion phase worker.

mod common;

use std::sync::Arc;

use common::{write_sources, FakeTranscoder};
use tempfile::TempDir;
use wavlink::adapters::EncodingProfile;
use wavlink::core::{collect_sources, ConversionEvent, Converter, Pipeline, PipelineError};
use wavlink::domain::{EventKind, Phase, PhaseState, PhaseStatus, SourceItem};

fn sources(paths: &[std::path::PathBuf]) -> Vec<SourceItem> {
    paths.iter().map(|p| SourceItem::new(p.clone())).collect()
}

#[tokio::test]
async fn test_progress_called_once_per_item_and_ends_at_one() {
    let temp = TempDir::new().unwrap();
    let inputs = write_sources(temp.path(), &["a.wav", "bad.wav", "c.wav", "d.wav"]);
    let out = temp.path().join("out");
    std::fs::create_dir_all(&out).unwrap();

    let converter = Converter::new(
        Arc::new(FakeTranscoder::failing(&["bad.wav"])),
        EncodingProfile::default(),
    );

    let mut fractions = Vec::new();
    let results = converter
        .convert(&sources(&inputs), &out, |event| {
            if let ConversionEvent::Progress { fraction, .. } = event {
                fractions.push(fraction);
            }
        })
        .await;

    assert_eq!(results.len(), 4);
    assert_eq!(fractions, vec![0.25, 0.5, 0.75, 1.0]);
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_results_keep_input_order_and_failure_does_not_stop_batch() {
    let temp = TempDir::new().unwrap();
    let inputs = write_sources(temp.path(), &["z.wav", "bad.wav", "a.wav"]);
    let out = temp.path().join("out");
    std::fs::create_dir_all(&out).unwrap();

    let transcoder = Arc::new(FakeTranscoder::failing(&["bad.wav"]));
    let converter = Converter::new(transcoder.clone(), EncodingProfile::default());

    let mut failures = Vec::new();
    let results = converter
        .convert(&sources(&inputs), &out, |event| {
            if let ConversionEvent::Failed { source, diagnostic } = event {
                failures.push((source.file_name(), diagnostic.to_string()));
            }
        })
        .await;

    let outputs: Vec<_> = results.iter().map(|r| r.output_path.clone()).collect();
    assert_eq!(
        outputs,
        vec![out.join("z.mp3"), out.join("bad.mp3"), out.join("a.mp3")]
    );
    assert!(results[0].is_success());
    assert!(!results[1].is_success());
    assert!(results[2].is_success());
    assert!(out.join("a.mp3").exists());

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "bad.wav");
    assert!(failures[0].1.contains("Invalid data found"));

    // Every item was attempted, in order
    assert_eq!(transcoder.calls.lock().unwrap().clone(), inputs);
}

#[tokio::test]
async fn test_conversion_phase_events_fold_into_status() {
    let temp = TempDir::new().unwrap();
    let inputs = write_sources(temp.path(), &["a.wav", "bad.wav"]);
    let out = temp.path().join("nested").join("out");

    let pipeline = Pipeline::new(Arc::new(FakeTranscoder::failing(&["bad.wav"])));
    let mut handle = pipeline
        .start_conversion(sources(&inputs), &out)
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        assert_eq!(event.phase_id, handle.phase_id);
        assert_eq!(event.phase, Phase::Conversion);
        events.push(event);
    }
    let results = handle.join().await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(out.is_dir());
    assert!(matches!(events[0].kind, EventKind::PhaseStarted { total: 2 }));
    assert!(matches!(
        events.last().unwrap().kind,
        EventKind::PhaseCompleted {
            succeeded: 1,
            failed: 1
        }
    ));

    let status = PhaseStatus::from_events(&events).unwrap();
    assert_eq!(status.state, PhaseState::Completed);
    assert_eq!(status.percent(), 100.0);
    assert_eq!(status.failures.len(), 1);
    assert_eq!(status.failures[0].0, "bad.wav");
}

#[tokio::test]
async fn test_missing_transcoder_fails_before_phase_starts() {
    let temp = TempDir::new().unwrap();
    let inputs = write_sources(temp.path(), &["a.wav"]);

    let transcoder = Arc::new(FakeTranscoder::missing());
    let pipeline = Pipeline::new(transcoder.clone());
    let result = pipeline
        .start_conversion(sources(&inputs), &temp.path().join("out"))
        .await;

    assert!(matches!(result, Err(PipelineError::Configuration(_))));
    assert!(transcoder.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_same_stem_in_nested_folders_is_rejected() {
    let temp = TempDir::new().unwrap();
    let input_dir = temp.path().join("in");
    let nested = input_dir.join("nested");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(input_dir.join("x.wav"), b"TOP").unwrap();
    std::fs::write(nested.join("x.wav"), b"NESTED").unwrap();
    let out = temp.path().join("out");

    let sources = collect_sources(&[input_dir], "wav").unwrap();
    assert_eq!(sources.len(), 2);

    let transcoder = Arc::new(FakeTranscoder::new());
    let pipeline = Pipeline::new(transcoder.clone());
    let err = match pipeline.start_conversion(sources, &out).await {
        Ok(_) => panic!("colliding outputs were accepted"),
        Err(err) => err,
    };

    assert!(matches!(err, PipelineError::Configuration(_)));
    let message = err.to_string();
    assert!(message.contains("nested"), "{}", message);
    assert!(message.contains("x.mp3"), "{}", message);
    assert!(transcoder.calls.lock().unwrap().is_empty());
    assert!(!out.join("x.mp3").exists());
}
