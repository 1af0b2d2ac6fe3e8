//! Video probing and sequential frame decoding.
//!
//! Frames are pulled from an ffmpeg child process as raw RGB24 on a pipe.
//! Decoding is strictly sequential; the engine never reads frames out of
//! order or in parallel within a run.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use image::RgbImage;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// Properties of the video under analysis.
#[derive(Debug, Clone, Copy)]
pub struct VideoInfo {
    /// Native width in pixels.
    pub width: u32,
    /// Native height in pixels.
    pub height: u32,
    /// Frame rate (fps).
    pub fps: f64,
    /// Duration in seconds.
    pub duration: f64,
    /// Total frame count; estimated from duration when the container does
    /// not carry it.
    pub total_frames: u64,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

/// Probe a video file for dimensions, frame rate and frame count.
pub async fn probe_video(path: impl AsRef<Path>) -> EngineResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(EngineError::input(format!(
            "video file not found: {}",
            path.display()
        )));
    }

    which::which("ffprobe")
        .map_err(|_| EngineError::resource("ffprobe not found in PATH"))?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| EngineError::resource(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(EngineError::input(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| EngineError::input(format!("unparseable ffprobe output: {e}")))?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| EngineError::input("no video stream found"))?;

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let fps = video_stream
        .avg_frame_rate
        .as_ref()
        .or(video_stream.r_frame_rate.as_ref())
        .and_then(|r| parse_frame_rate(r))
        .unwrap_or(30.0);

    let total_frames = video_stream
        .nb_frames
        .as_ref()
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or_else(|| (duration * fps).round() as u64);

    let info = VideoInfo {
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        duration,
        total_frames,
    };

    debug!(
        width = info.width,
        height = info.height,
        fps = info.fps,
        total_frames = info.total_frames,
        "Probed video"
    );

    Ok(info)
}

/// Parse a frame rate string (e.g. "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
    }
    s.parse().ok()
}

/// Sequential frame supplier for one run.
#[async_trait]
pub trait FrameStream: Send {
    /// Next decoded frame, or `None` when the source is exhausted.
    async fn next_frame(&mut self) -> EngineResult<Option<RgbImage>>;

    /// Release the underlying source promptly.
    async fn close(&mut self);
}

/// Frame source decoding through an ffmpeg child process.
pub struct FfmpegFrameSource {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    buf: Vec<u8>,
    finished: bool,
}

impl FfmpegFrameSource {
    /// Open the video and start decoding from the first frame.
    pub async fn open(path: impl AsRef<Path>, info: &VideoInfo) -> EngineResult<Self> {
        let path = path.as_ref();

        which::which("ffmpeg")
            .map_err(|_| EngineError::resource("ffmpeg not found in PATH"))?;

        if info.width == 0 || info.height == 0 {
            return Err(EngineError::input(format!(
                "video reports invalid dimensions {}x{}",
                info.width, info.height
            )));
        }

        let mut child = Command::new("ffmpeg")
            .arg("-v")
            .arg("error")
            .arg("-i")
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-an", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::input(format!("failed to spawn decoder: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::input("decoder stdout not captured"))?;

        let frame_len = info.width as usize * info.height as usize * 3;
        Ok(Self {
            child,
            stdout,
            width: info.width,
            height: info.height,
            buf: vec![0u8; frame_len],
            finished: false,
        })
    }
}

#[async_trait]
impl FrameStream for FfmpegFrameSource {
    async fn next_frame(&mut self) -> EngineResult<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }

        // Fill one full frame; EOF at a frame boundary ends the stream,
        // EOF inside a frame is a decode failure.
        let mut filled = 0usize;
        while filled < self.buf.len() {
            let n = self
                .stdout
                .read(&mut self.buf[filled..])
                .await
                .map_err(|e| EngineError::frame_processing(format!("decoder read failed: {e}")))?;
            if n == 0 {
                if filled == 0 {
                    self.finished = true;
                    let status = self.child.wait().await.map_err(|e| {
                        EngineError::frame_processing(format!("decoder wait failed: {e}"))
                    })?;
                    if !status.success() {
                        return Err(EngineError::frame_processing(format!(
                            "decoder exited with {status}"
                        )));
                    }
                    return Ok(None);
                }
                return Err(EngineError::frame_processing(format!(
                    "truncated frame: got {filled} of {} bytes",
                    self.buf.len()
                )));
            }
            filled += n;
        }

        let frame = RgbImage::from_raw(self.width, self.height, self.buf.clone())
            .ok_or_else(|| EngineError::frame_processing("frame buffer size mismatch"))?;
        Ok(Some(frame))
    }

    async fn close(&mut self) {
        if !self.finished {
            if let Err(e) = self.child.kill().await {
                warn!("failed to kill decoder process: {e}");
            }
            self.finished = true;
        }
    }
}

/// In-memory frame source for tests.
pub struct VecFrameSource {
    frames: VecDeque<RgbImage>,
    closed: bool,
}

impl VecFrameSource {
    /// Source that yields the given frames in order.
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames: frames.into(),
            closed: false,
        }
    }

    /// `count` blank frames of the given size.
    pub fn blank(count: usize, width: u32, height: u32) -> Self {
        Self::new((0..count).map(|_| RgbImage::new(width, height)).collect())
    }
}

#[async_trait]
impl FrameStream for VecFrameSource {
    async fn next_frame(&mut self) -> EngineResult<Option<RgbImage>> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.frames.pop_front())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[tokio::test]
    async fn test_probe_missing_file_is_input_error() {
        let err = probe_video("/nonexistent/video.mp4").await.unwrap_err();
        assert!(matches!(err, EngineError::Input(_)));
    }

    #[tokio::test]
    async fn test_vec_source_drains_then_ends() {
        let mut source = VecFrameSource::blank(2, 4, 4);
        assert!(source.next_frame().await.unwrap().is_some());
        assert!(source.next_frame().await.unwrap().is_some());
        assert!(source.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_vec_source_close_stops_reads() {
        let mut source = VecFrameSource::blank(5, 4, 4);
        source.close().await;
        assert!(source.next_frame().await.unwrap().is_none());
    }
}
