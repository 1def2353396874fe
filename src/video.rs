use crate::error::{LapsecamError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

/// Capability to turn an ordered frame sequence into a single video file.
#[async_trait]
pub trait VideoAssembler: Send + Sync {
    /// Encode `frames` (already in playback order) into a video at `output`.
    /// On failure the caller must treat anything written to `output` as
    /// invalid; `FfmpegAssembler` itself leaves no partial output behind.
    async fn assemble(&self, frames: &[PathBuf], output: &Path, fps: u32) -> Result<()>;
}

/// Encodes frame sequences with the ffmpeg concat demuxer.
pub struct FfmpegAssembler;

impl FfmpegAssembler {
    async fn run_ffmpeg(&self, list_path: &Path, output: &Path, fps: u32) -> Result<()> {
        let status = Command::new("ffmpeg")
            .arg("-y")
            .args(["-f", "concat"])
            .args(["-safe", "0"])
            .args(["-r", &fps.to_string()])
            .arg("-i")
            .arg(list_path)
            .args(["-c:v", "libx264"])
            .args(["-pix_fmt", "yuv420p"])
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| LapsecamError::assembly(format!("failed to run ffmpeg: {e}")))?;

        if !status.success() {
            return Err(LapsecamError::assembly(format!(
                "ffmpeg exited with {status}"
            )));
        }

        Ok(())
    }

    async fn write_concat_list(&self, frames: &[PathBuf], output: &Path) -> Result<PathBuf> {
        let list_path = output.with_extension("frames.txt");

        let mut list = String::new();
        for frame in frames {
            list.push_str(&format!("file '{}'\n", frame.display()));
        }

        fs::write(&list_path, list).await?;
        Ok(list_path)
    }
}

#[async_trait]
impl VideoAssembler for FfmpegAssembler {
    async fn assemble(&self, frames: &[PathBuf], output: &Path, fps: u32) -> Result<()> {
        if frames.is_empty() {
            return Err(LapsecamError::assembly("no frames to encode"));
        }

        debug!(
            "Assembling {} frames into {} at {} fps",
            frames.len(),
            output.display(),
            fps
        );

        let list_path = self.write_concat_list(frames, output).await?;
        let result = self.run_ffmpeg(&list_path, output, fps).await;
        let _ = fs::remove_file(&list_path).await;

        if result.is_err() {
            // Never leave a half-written video at the output path
            let _ = fs::remove_file(output).await;
        } else {
            info!("Video created: {}", output.display());
        }

        result
    }
}
