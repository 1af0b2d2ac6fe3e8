//! Output artifact sinks.
//!
//! Rendered frames are appended in arrival order and encoded into one
//! playback-ready MP4 per run. A failed run never leaves a partial
//! artifact behind.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use image::RgbImage;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// Destination for rendered frames.
#[async_trait]
pub trait ArtifactSink: Send {
    /// Append one rendered frame.
    async fn write(&mut self, frame: &RgbImage) -> EngineResult<()>;

    /// Flush and close the artifact. The sink is unusable afterwards.
    async fn finish(&mut self) -> EngineResult<()>;

    /// Abort the artifact: stop the encoder and remove any partial output.
    async fn discard(&mut self);

    /// Path of the artifact this sink produces, when it produces one.
    fn artifact(&self) -> Option<PathBuf>;
}

/// H.264 encoder sink backed by an ffmpeg child process.
pub struct FfmpegFrameSink {
    child: Child,
    stdin: Option<ChildStdin>,
    output: PathBuf,
    width: u32,
    height: u32,
    frames_written: u64,
}

impl FfmpegFrameSink {
    /// Create the sink and start the encoder.
    ///
    /// Frames must match `width`x`height`; they are encoded at `fps` into
    /// a web-playable MP4 (libx264, yuv420p, faststart).
    pub async fn create(
        output: impl AsRef<Path>,
        width: u32,
        height: u32,
        fps: f64,
    ) -> EngineResult<Self> {
        let output = output.as_ref().to_path_buf();

        which::which("ffmpeg")
            .map_err(|_| EngineError::resource("ffmpeg not found in PATH"))?;

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    EngineError::resource(format!(
                        "failed to create output directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let mut child = Command::new("ffmpeg")
            .arg("-y")
            .arg("-v")
            .arg("error")
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s")
            .arg(format!("{width}x{height}"))
            .arg("-r")
            .arg(format!("{fps:.3}"))
            .args(["-i", "-"])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .args(["-movflags", "+faststart"])
            .arg(&output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            // Never piped: an undrained stderr pipe can fill up and stall
            // the frame writes.
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::resource(format!("failed to spawn encoder: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::resource("encoder stdin not captured"))?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            output,
            width,
            height,
            frames_written: 0,
        })
    }

    async fn remove_partial(&self) {
        if self.output.exists() {
            if let Err(e) = tokio::fs::remove_file(&self.output).await {
                warn!(
                    output = %self.output.display(),
                    "failed to remove partial artifact: {e}"
                );
            }
        }
    }
}

#[async_trait]
impl ArtifactSink for FfmpegFrameSink {
    async fn write(&mut self, frame: &RgbImage) -> EngineResult<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(EngineError::resource(format!(
                "frame size {}x{} does not match sink {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| EngineError::resource("sink already closed"))?;

        stdin
            .write_all(frame.as_raw())
            .await
            .map_err(|e| EngineError::resource(format!("encoder write failed: {e}")))?;
        self.frames_written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> EngineResult<()> {
        // Closing stdin tells the encoder the stream is complete.
        drop(self.stdin.take());

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| EngineError::resource(format!("encoder wait failed: {e}")))?;

        if !status.success() {
            self.remove_partial().await;
            return Err(EngineError::resource(format!(
                "encoder exited with {status}"
            )));
        }

        debug!(
            output = %self.output.display(),
            frames = self.frames_written,
            "Artifact finalized"
        );
        Ok(())
    }

    async fn discard(&mut self) {
        drop(self.stdin.take());
        if let Err(e) = self.child.kill().await {
            warn!("failed to kill encoder process: {e}");
        }
        let _ = self.child.wait().await;
        self.remove_partial().await;
    }

    fn artifact(&self) -> Option<PathBuf> {
        Some(self.output.clone())
    }
}

/// Sink that counts frames and produces no artifact; used by modes whose
/// sink is the consumer stream, and by tests.
#[derive(Debug, Default)]
pub struct NullSink {
    frames_written: u64,
    discarded: bool,
}

impl NullSink {
    /// Create an empty null sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames accepted so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Whether the run discarded this sink.
    pub fn discarded(&self) -> bool {
        self.discarded
    }
}

#[async_trait]
impl ArtifactSink for NullSink {
    async fn write(&mut self, _frame: &RgbImage) -> EngineResult<()> {
        self.frames_written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> EngineResult<()> {
        Ok(())
    }

    async fn discard(&mut self) {
        self.discarded = true;
    }

    fn artifact(&self) -> Option<PathBuf> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_sink_counts_frames() {
        let mut sink = NullSink::new();
        let frame = RgbImage::new(4, 4);
        sink.write(&frame).await.unwrap();
        sink.write(&frame).await.unwrap();
        assert_eq!(sink.frames_written(), 2);
        assert!(sink.artifact().is_none());
        sink.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_null_sink_discard_flag() {
        let mut sink = NullSink::new();
        sink.discard().await;
        assert!(sink.discarded());
    }

    #[tokio::test]
    async fn test_encoder_accepts_sustained_writes() {
        if which::which("ffmpeg").is_err() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let mut sink = FfmpegFrameSink::create(&output, 64, 64, 30.0).await.unwrap();

        let frame = RgbImage::new(64, 64);
        for _ in 0..90 {
            sink.write(&frame).await.unwrap();
        }
        sink.finish().await.unwrap();

        assert!(output.metadata().unwrap().len() > 0);
    }
}
