//! Person detection using a YOLOv8 ONNX model.
//!
//! The rest of the engine depends only on the [`PersonDetector`] trait;
//! the ONNX-backed implementation loads its session lazily, exactly once
//! per process, and reuses it across runs. Model compatibility is a
//! versioned ONNX contract at this boundary.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use image::RgbImage;
use ndarray::Array;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use ccount_models::{BoundingBox, PersonDetection};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// COCO class index for "person"; the only class this engine consumes.
const PERSON_CLASS: usize = 0;
const NUM_CLASSES: usize = 80;
const BOX_FEATURES: usize = 4 + NUM_CLASSES;

/// Frame-level person detection capability.
///
/// Implementations must be safe to share across concurrently active runs;
/// a backend that is not reentrant must serialize its own invocations.
#[async_trait]
pub trait PersonDetector: Send + Sync {
    /// Backend identifier for logging.
    fn name(&self) -> &'static str;

    /// Pay any one-time initialization cost.
    ///
    /// Called before the first frame of a run; a failure here aborts the
    /// run before any frame is processed.
    async fn ensure_loaded(&self) -> EngineResult<()>;

    /// Detect persons in one RGB frame, in native pixel coordinates.
    async fn detect(&self, frame: &RgbImage) -> EngineResult<Vec<PersonDetection>>;
}

/// Detector configuration, split from [`EngineConfig`] so the detector can
/// be constructed standalone.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub model_path: std::path::PathBuf,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub input_size: u32,
}

impl From<&EngineConfig> for DetectorConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            model_path: config.model_path.clone(),
            confidence_threshold: config.confidence_threshold,
            nms_threshold: config.nms_threshold,
            input_size: config.input_size,
        }
    }
}

/// YOLOv8 person detector backed by ONNX Runtime.
///
/// The session sits behind a `Mutex`: ONNX inference through `&mut` access
/// is the single shared inference slot, so concurrently active runs take
/// turns instead of assuming the backend is reentrant.
pub struct YoloPersonDetector {
    config: DetectorConfig,
    session: OnceCell<Mutex<Session>>,
}

impl YoloPersonDetector {
    /// Create a detector; the model is not touched until the first run.
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            session: OnceCell::new(),
        }
    }

    async fn session(&self) -> EngineResult<&Mutex<Session>> {
        self.session
            .get_or_try_init(|| async {
                let session = create_session(&self.config.model_path)?;
                info!(
                    model_path = %self.config.model_path.display(),
                    input_size = self.config.input_size,
                    "Person detector initialized"
                );
                Ok(Mutex::new(session))
            })
            .await
    }

    /// Resize to the square model input, normalize to [0, 1], NCHW layout.
    fn preprocess(&self, frame: &RgbImage) -> EngineResult<Value> {
        let size = self.config.input_size;
        let resized = image::imageops::resize(
            frame,
            size,
            size,
            image::imageops::FilterType::Triangle,
        );

        let (w, h) = (size as usize, size as usize);
        let mut chw_data: Vec<f32> = Vec::with_capacity(3 * h * w);
        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    let pixel = resized.get_pixel(x as u32, y as u32);
                    chw_data.push(pixel[c] as f32 / 255.0);
                }
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| EngineError::frame_processing(format!("failed to create tensor: {e}")))
    }

    fn run_inference(&self, session: &Mutex<Session>, input: Value) -> EngineResult<Vec<f32>> {
        let mut session = session
            .lock()
            .map_err(|_| EngineError::frame_processing("inference session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| EngineError::frame_processing(format!("ONNX inference failed: {e}")))?;

        let output = outputs
            .get("output0")
            .ok_or_else(|| EngineError::frame_processing("missing output0 tensor"))?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| EngineError::frame_processing(format!("failed to extract tensor: {e}")))?;

        Ok(tensor.1.iter().copied().collect())
    }

    /// Parse the YOLOv8 output and keep person boxes above threshold.
    ///
    /// Output layout is [1, 84, N]: 4 bbox values (cx, cy, w, h in model
    /// coordinates) followed by 80 class scores per candidate.
    fn postprocess(
        &self,
        outputs: &[f32],
        frame_width: u32,
        frame_height: u32,
    ) -> EngineResult<Vec<PersonDetection>> {
        if outputs.is_empty() || outputs.len() % BOX_FEATURES != 0 {
            return Err(EngineError::frame_processing(format!(
                "unexpected output size {}, not a multiple of {}",
                outputs.len(),
                BOX_FEATURES
            )));
        }
        let num_boxes = outputs.len() / BOX_FEATURES;

        let output_array = Array::from_shape_vec((BOX_FEATURES, num_boxes), outputs.to_vec())
            .map_err(|e| EngineError::frame_processing(format!("failed to reshape output: {e}")))?;
        let transposed = output_array.t();

        let input_size = self.config.input_size as f32;
        let scale_w = frame_width as f32 / input_size;
        let scale_h = frame_height as f32 / input_size;

        let mut candidates: Vec<PersonDetection> = Vec::new();
        for i in 0..num_boxes {
            let score = transposed[[i, 4 + PERSON_CLASS]];
            if score < self.config.confidence_threshold {
                continue;
            }

            let cx = transposed[[i, 0]];
            let cy = transposed[[i, 1]];
            let w = transposed[[i, 2]];
            let h = transposed[[i, 3]];

            let x1 = ((cx - w / 2.0) * scale_w).clamp(0.0, frame_width as f32);
            let y1 = ((cy - h / 2.0) * scale_h).clamp(0.0, frame_height as f32);
            let x2 = ((cx + w / 2.0) * scale_w).clamp(0.0, frame_width as f32);
            let y2 = ((cy + h / 2.0) * scale_h).clamp(0.0, frame_height as f32);

            candidates.push(PersonDetection::new(BoundingBox::new(x1, y1, x2, y2), score));
        }

        Ok(non_maximum_suppression(
            candidates,
            self.config.nms_threshold,
        ))
    }
}

#[async_trait]
impl PersonDetector for YoloPersonDetector {
    fn name(&self) -> &'static str {
        "yolov8-onnx"
    }

    async fn ensure_loaded(&self) -> EngineResult<()> {
        self.session().await.map(|_| ())
    }

    async fn detect(&self, frame: &RgbImage) -> EngineResult<Vec<PersonDetection>> {
        let session = self.session().await?;
        let input = self.preprocess(frame)?;
        let outputs = self.run_inference(session, input)?;
        let detections = self.postprocess(&outputs, frame.width(), frame.height())?;

        debug!(count = detections.len(), "Person detection completed");
        Ok(detections)
    }
}

/// Remove overlapping person boxes, keeping the most confident.
fn non_maximum_suppression(
    mut detections: Vec<PersonDetection>,
    iou_threshold: f32,
) -> Vec<PersonDetection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i]);
        for j in (i + 1)..detections.len() {
            if !suppressed[j] && compute_iou(&detections[i].bbox, &detections[j].bbox) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection over union of two pixel-space boxes.
fn compute_iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Create an ONNX Runtime session for the model at `path`.
fn create_session(path: &Path) -> EngineResult<Session> {
    if !path.exists() {
        return Err(EngineError::model_unavailable(format!(
            "model file not found: {}",
            path.display()
        )));
    }

    let model_bytes = std::fs::read(path)
        .map_err(|e| EngineError::model_unavailable(format!("failed to read model file: {e}")))?;

    let mut builder = Session::builder()
        .map_err(|e| EngineError::model_unavailable(format!("failed to create session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| EngineError::model_unavailable(format!("failed to set optimization level: {e}")))?;

    // Try CUDA on Linux with the cuda feature enabled
    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for person detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, falling back to CPU");
    }

    info!("Using CPU execution provider for person detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| EngineError::model_unavailable(format!("failed to load ONNX model: {e}")))
}

/// Scripted detector for tests and model-less deployments.
///
/// Yields the next scripted frame on every call and counts invocations,
/// which lets callers assert that no detection happened after a
/// cancellation was observed.
pub struct StubDetector {
    frames: Mutex<std::collections::VecDeque<Vec<PersonDetection>>>,
    calls: std::sync::atomic::AtomicUsize,
    fail_load: bool,
}

impl StubDetector {
    /// Detector that yields the given per-frame detections, then empties.
    pub fn with_frames(frames: Vec<Vec<PersonDetection>>) -> Self {
        Self {
            frames: Mutex::new(frames.into()),
            calls: std::sync::atomic::AtomicUsize::new(0),
            fail_load: false,
        }
    }

    /// Detector whose initialization fails.
    pub fn failing_load() -> Self {
        Self {
            frames: Mutex::new(Default::default()),
            calls: std::sync::atomic::AtomicUsize::new(0),
            fail_load: true,
        }
    }

    /// Number of `detect` invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl PersonDetector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn ensure_loaded(&self) -> EngineResult<()> {
        if self.fail_load {
            return Err(EngineError::model_unavailable("stub configured to fail"));
        }
        Ok(())
    }

    async fn detect(&self, _frame: &RgbImage) -> EngineResult<Vec<PersonDetection>> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut frames = self
            .frames
            .lock()
            .map_err(|_| EngineError::frame_processing("stub lock poisoned"))?;
        Ok(frames.pop_front().unwrap_or_default())
    }
}
