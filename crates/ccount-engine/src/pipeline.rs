//! Pipeline orchestration: run lifecycle, the shared frame loop, and the
//! three consumption modes layered on top of it.
//!
//! One run moves through Idle, Initializing, Running, Finalizing and ends
//! in Completed or Failed. Frame processing within a run is strictly
//! sequential; distinct runs may execute concurrently and share only the
//! progress tracker and the detector's inference slot.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageEncoder, RgbImage};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use ccount_models::{AnalysisEvent, RunKey, RunResult, Zone, ZoneSnapshot};

use crate::aggregator::OccupancyAggregator;
use crate::config::EngineConfig;
use crate::detector::PersonDetector;
use crate::error::{EngineError, EngineResult};
use crate::geometry::{scale_zones, ScaledZone};
use crate::progress::ProgressTracker;
use crate::renderer::OverlayRenderer;
use crate::sink::{ArtifactSink, FfmpegFrameSink};
use crate::source::{probe_video, FfmpegFrameSource, FrameStream};

/// Lifecycle state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Initializing,
    Running,
    Finalizing,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Initializing => "initializing",
            RunState::Running => "running",
            RunState::Finalizing => "finalizing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One analysis request: a video reference plus the zones to monitor.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Byte-readable video reference.
    pub video: PathBuf,
    /// Ordered zone list; the order is canonical for attribution.
    pub zones: Vec<Zone>,
    /// Progress key; derived from the video when not supplied.
    pub run_key: Option<RunKey>,
}

impl AnalysisRequest {
    /// Request over a video with the given zones.
    pub fn new(video: impl Into<PathBuf>, zones: Vec<Zone>) -> Self {
        Self {
            video: video.into(),
            zones,
            run_key: None,
        }
    }

    /// Run under an explicit progress key.
    pub fn with_run_key(mut self, key: RunKey) -> Self {
        self.run_key = Some(key);
        self
    }

    fn key(&self) -> RunKey {
        self.run_key
            .clone()
            .unwrap_or_else(|| RunKey::for_video(&self.video))
    }
}

/// Consumer-side view of one processed frame.
struct FrameSnapshot<'a> {
    frame_number: u64,
    total_frames: u64,
    rendered: &'a RgbImage,
    aggregator: &'a OccupancyAggregator,
}

impl FrameSnapshot<'_> {
    fn zone_snapshots(&self) -> Vec<ZoneSnapshot> {
        let frame_counts = self.aggregator.frame_counts();
        let peak_counts = self.aggregator.peak_counts();
        self.aggregator
            .labels()
            .zip(frame_counts.into_iter().zip(peak_counts))
            .map(|((zone_id, zone_label), (count, peak))| ZoneSnapshot {
                zone_id,
                zone_label: zone_label.to_string(),
                count,
                peak,
            })
            .collect()
    }
}

/// Per-mode consumer of the shared frame loop.
///
/// `on_frame` returning `Ok(false)` (or `is_connected` turning false)
/// means the consumer is gone; the loop stops reading frames and releases
/// its resources without invoking the detector again. An `Err` from
/// `on_frame` is an emission failure, not a disconnect, and fails the run
/// with that classification.
#[async_trait]
trait RunObserver: Send {
    fn is_connected(&self) -> bool {
        true
    }

    async fn on_frame(&mut self, snapshot: FrameSnapshot<'_>) -> EngineResult<bool> {
        let _ = snapshot;
        Ok(true)
    }

    async fn on_completed(&mut self, result: &RunResult) {
        let _ = result;
    }

    async fn on_failed(&mut self, error: &EngineError) {
        let _ = error;
    }
}

/// Batch mode: no per-frame emission.
struct BatchObserver;

#[async_trait]
impl RunObserver for BatchObserver {}

/// Incremental-event mode: one structured update per frame, closed by a
/// terminal event.
struct EventObserver {
    tx: mpsc::Sender<AnalysisEvent>,
}

#[async_trait]
impl RunObserver for EventObserver {
    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn on_frame(&mut self, snapshot: FrameSnapshot<'_>) -> EngineResult<bool> {
        let event = AnalysisEvent::Frame {
            frame_number: snapshot.frame_number,
            total_frames: snapshot.total_frames,
            zones: snapshot.zone_snapshots(),
        };
        Ok(self.tx.send(event).await.is_ok())
    }

    async fn on_completed(&mut self, result: &RunResult) {
        let _ = self
            .tx
            .send(AnalysisEvent::Completed {
                result: result.clone(),
            })
            .await;
    }

    async fn on_failed(&mut self, error: &EngineError) {
        let _ = self
            .tx
            .send(AnalysisEvent::Failed {
                message: error.to_string(),
            })
            .await;
    }
}

/// Continuous-image mode: every rendered frame as a self-delimited JPEG
/// chunk; no terminal summary.
struct JpegObserver {
    tx: mpsc::Sender<Vec<u8>>,
    quality: u8,
}

#[async_trait]
impl RunObserver for JpegObserver {
    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn on_frame(&mut self, snapshot: FrameSnapshot<'_>) -> EngineResult<bool> {
        let frame = snapshot.rendered;
        let mut chunk = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut chunk, self.quality);
        encoder
            .write_image(
                frame.as_raw(),
                frame.width(),
                frame.height(),
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| {
                EngineError::frame_processing(format!("failed to encode frame chunk: {e}"))
            })?;
        Ok(self.tx.send(chunk).await.is_ok())
    }
}

/// The analysis pipeline: detector, progress store and renderer wired
/// together, shared by all runs of the process.
///
/// The detector is an injected dependency, so tests (and model-less
/// deployments) can substitute the backend.
#[derive(Clone)]
pub struct AnalysisPipeline {
    detector: Arc<dyn PersonDetector>,
    progress: ProgressTracker,
    renderer: Arc<OverlayRenderer>,
    config: Arc<EngineConfig>,
}

impl AnalysisPipeline {
    /// Create a pipeline around an injected detector.
    pub fn new(detector: Arc<dyn PersonDetector>, progress: ProgressTracker, config: EngineConfig) -> Self {
        let renderer = Arc::new(OverlayRenderer::from_font_path(&config.font_path));
        Self {
            detector,
            progress,
            renderer,
            config: Arc::new(config),
        }
    }

    /// The progress tracker runs publish into.
    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Batch mode: process the whole video, write the annotated artifact
    /// to `output`, and return the result summary.
    pub async fn analyze(
        &self,
        request: AnalysisRequest,
        output: impl AsRef<Path>,
    ) -> EngineResult<RunResult> {
        self.execute(request, Some(output.as_ref().to_path_buf()), &mut BatchObserver)
            .await
    }

    /// Incremental-event mode: one [`AnalysisEvent::Frame`] per frame,
    /// closed by `Completed` or `Failed`. Dropping the receiver cancels
    /// the run.
    pub fn analyze_events(
        &self,
        request: AnalysisRequest,
        output: impl AsRef<Path>,
    ) -> mpsc::Receiver<AnalysisEvent> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let pipeline = self.clone();
        let output = output.as_ref().to_path_buf();
        tokio::spawn(async move {
            let mut observer = EventObserver { tx };
            if let Err(e) = pipeline.execute(request, Some(output), &mut observer).await {
                if !e.is_cancellation() {
                    error!("event-mode run failed: {e}");
                }
            }
        });
        rx
    }

    /// Continuous-image mode: every rendered frame as a JPEG chunk. The
    /// stream is the sink; no file artifact is produced and there is no
    /// terminal summary. Dropping the receiver cancels the run.
    pub fn analyze_frames(&self, request: AnalysisRequest) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let pipeline = self.clone();
        let quality = self.config.jpeg_quality;
        tokio::spawn(async move {
            let mut observer = JpegObserver { tx, quality };
            if let Err(e) = pipeline.execute(request, None, &mut observer).await {
                if !e.is_cancellation() {
                    error!("continuous-mode run failed: {e}");
                }
            }
        });
        rx
    }

    /// Initialization shared by all modes; see `run_frames` for the loop.
    async fn execute(
        &self,
        request: AnalysisRequest,
        output: Option<PathBuf>,
        observer: &mut dyn RunObserver,
    ) -> EngineResult<RunResult> {
        let key = request.key();
        let mut state = RunState::Idle;
        transition(&mut state, RunState::Initializing, &key);

        let setup = match self.initialize(&request, output.as_deref()).await {
            Ok(setup) => setup,
            Err(e) => {
                transition(&mut state, RunState::Failed, &key);
                observer.on_failed(&e).await;
                return Err(e);
            }
        };

        transition(&mut state, RunState::Running, &key);
        let outcome = self
            .run_frames(setup, &key, observer, &mut state)
            .await;

        match &outcome {
            Ok(result) => {
                transition(&mut state, RunState::Completed, &key);
                info!(
                    run_key = %key,
                    total_count = result.total_count,
                    "Analysis completed"
                );
            }
            Err(e) => {
                transition(&mut state, RunState::Failed, &key);
                if !e.is_cancellation() {
                    observer.on_failed(e).await;
                }
            }
        }
        outcome
    }

    async fn initialize(
        &self,
        request: &AnalysisRequest,
        output: Option<&Path>,
    ) -> EngineResult<RunSetup> {
        if request.zones.is_empty() {
            return Err(EngineError::configuration(
                "a run requires at least one zone",
            ));
        }
        for zone in &request.zones {
            zone.validate()
                .map_err(|e| EngineError::configuration(e.to_string()))?;
        }

        let info = probe_video(&request.video).await?;

        self.detector.ensure_loaded().await?;

        let scaled = scale_zones(&request.zones, info.width, info.height)?;

        let source = FfmpegFrameSource::open(&request.video, &info).await?;

        let sink: Option<Box<dyn ArtifactSink>> = match output {
            Some(path) => Some(Box::new(
                FfmpegFrameSink::create(path, info.width, info.height, info.fps).await?,
            )),
            None => None,
        };

        info!(
            video = %request.video.display(),
            zones = scaled.len(),
            detector = self.detector.name(),
            total_frames = info.total_frames,
            "Analysis initialized"
        );

        Ok(RunSetup {
            source: Box::new(source),
            sink,
            total_frames: info.total_frames,
            scaled,
        })
    }

    /// The frame loop every mode shares: decode, detect, attribute,
    /// update peaks and progress, render, emit. Fail-fast: the first
    /// error aborts the run and discards any partial artifact.
    async fn run_frames(
        &self,
        mut setup: RunSetup,
        key: &RunKey,
        observer: &mut dyn RunObserver,
        state: &mut RunState,
    ) -> EngineResult<RunResult> {
        let mut aggregator = OccupancyAggregator::new(&setup.scaled);
        self.progress.set(key, 0, setup.total_frames);

        let mut frame_number = 0u64;
        let outcome = loop {
            if !observer.is_connected() {
                break Err(EngineError::Cancelled);
            }

            let mut frame = match setup.source.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            frame_number += 1;
            self.progress.set(key, frame_number, setup.total_frames);

            let detections = match self.detector.detect(&frame).await {
                Ok(detections) => detections,
                Err(e) => break Err(e),
            };

            let attributions = aggregator.observe_frame(&detections, &setup.scaled);
            self.renderer
                .render(&mut frame, &setup.scaled, &detections, &attributions);

            if let Some(sink) = setup.sink.as_mut() {
                if let Err(e) = sink.write(&frame).await {
                    break Err(e);
                }
            }

            let snapshot = FrameSnapshot {
                frame_number,
                total_frames: setup.total_frames,
                rendered: &frame,
                aggregator: &aggregator,
            };
            match observer.on_frame(snapshot).await {
                Ok(true) => {}
                Ok(false) => break Err(EngineError::Cancelled),
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = outcome {
            setup.source.close().await;
            if let Some(sink) = setup.sink.as_mut() {
                sink.discard().await;
            }
            return Err(e);
        }

        transition(state, RunState::Finalizing, key);
        let artifact = setup.sink.as_ref().and_then(|s| s.artifact());
        if let Some(sink) = setup.sink.as_mut() {
            sink.finish().await?;
        }

        let result = aggregator.finalize(artifact);
        observer.on_completed(&result).await;
        Ok(result)
    }
}

struct RunSetup {
    source: Box<dyn FrameStream>,
    sink: Option<Box<dyn ArtifactSink>>,
    total_frames: u64,
    scaled: Vec<ScaledZone>,
}

fn transition(state: &mut RunState, next: RunState, key: &RunKey) {
    debug!(run_key = %key, from = %state, to = %next, "Run state transition");
    *state = next;
}

/// Output path in the shape the original service used:
/// `analyzed_<tag>_<YYYYmmdd_HHMMSS>.mp4` under `dir`.
pub fn default_output_path(dir: impl AsRef<Path>, tag: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.as_ref().join(format!("analyzed_{tag}_{stamp}.mp4"))
}
