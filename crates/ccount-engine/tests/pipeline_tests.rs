//! Pipeline integration tests over the public API.
//!
//! These run without ffmpeg, a model file, or real video: they exercise
//! the validation and failure paths every mode shares.

use std::sync::Arc;

use ccount_engine::{AnalysisPipeline, AnalysisRequest, EngineConfig, EngineError, ProgressTracker};
use ccount_models::{AnalysisEvent, Point, Zone};

fn zone() -> Zone {
    Zone::new(
        1,
        "entrance",
        vec![
            Point::new(0.0, 0.0),
            Point::new(640.0, 0.0),
            Point::new(640.0, 360.0),
            Point::new(0.0, 360.0),
        ],
    )
}

fn pipeline() -> AnalysisPipeline {
    let detector = Arc::new(ccount_engine::detector::StubDetector::with_frames(vec![]));
    AnalysisPipeline::new(detector, ProgressTracker::new(), EngineConfig::default())
}

#[tokio::test]
async fn batch_rejects_empty_zone_list() {
    let err = pipeline()
        .analyze(AnalysisRequest::new("/tmp/missing.mp4", vec![]), "/tmp/out.mp4")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));
}

#[tokio::test]
async fn batch_rejects_degenerate_polygon() {
    let bad = Zone::new(2, "line", vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
    let err = pipeline()
        .analyze(AnalysisRequest::new("/tmp/missing.mp4", vec![bad]), "/tmp/out.mp4")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));
}

#[tokio::test]
async fn event_stream_closes_with_failed_on_bad_input() {
    let mut rx = pipeline().analyze_events(
        AnalysisRequest::new("/nonexistent/video.mp4", vec![zone()]),
        "/tmp/out.mp4",
    );

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], AnalysisEvent::Failed { .. }));
    assert!(events[0].is_terminal());
}

#[tokio::test]
async fn continuous_stream_closes_silently_on_bad_input() {
    let mut rx =
        pipeline().analyze_frames(AnalysisRequest::new("/nonexistent/video.mp4", vec![zone()]));
    // No chunk is ever produced; the channel just closes.
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn progress_key_defaults_to_video_reference() {
    let pipeline = pipeline();
    let _ = pipeline
        .analyze(
            AnalysisRequest::new("/nonexistent/video.mp4", vec![zone()]),
            "/tmp/out.mp4",
        )
        .await;

    // The run failed during initialization, so no progress was published
    // and pollers see the zero record.
    let record = pipeline
        .progress()
        .get(&ccount_models::RunKey::for_video("/nonexistent/video.mp4"));
    assert_eq!(record.current, 0);
    assert_eq!(record.percentage, 0);
}
