//! Engine configuration.

use std::path::PathBuf;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the YOLOv8 ONNX model file.
    pub model_path: PathBuf,
    /// Confidence threshold for person detections.
    pub confidence_threshold: f32,
    /// IoU threshold for non-maximum suppression.
    pub nms_threshold: f32,
    /// Model input size (the model expects square input).
    pub input_size: u32,
    /// TrueType font used for overlay labels; labels are skipped when the
    /// file is missing.
    pub font_path: PathBuf,
    /// JPEG quality for continuous-image mode chunks.
    pub jpeg_quality: u8,
    /// Capacity of streaming-mode channels.
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/yolov8n.onnx"),
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
            font_path: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
            jpeg_quality: 80,
            channel_capacity: 32,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_path: std::env::var("CCOUNT_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            confidence_threshold: std::env::var("CCOUNT_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.confidence_threshold),
            nms_threshold: std::env::var("CCOUNT_NMS_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.nms_threshold),
            input_size: std::env::var("CCOUNT_INPUT_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.input_size),
            font_path: std::env::var("CCOUNT_FONT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.font_path),
            jpeg_quality: std::env::var("CCOUNT_JPEG_QUALITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.jpeg_quality),
            channel_capacity: std::env::var("CCOUNT_CHANNEL_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.channel_capacity),
        }
    }
}
