use crate::config::CameraConfig;
use crate::error::{LapsecamError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Still-image resolution in `WIDTHxHEIGHT` form (e.g., "640x480").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Resolution {
    type Err = LapsecamError;

    fn from_str(s: &str) -> Result<Self> {
        let (width, height) = s
            .split_once('x')
            .ok_or_else(|| LapsecamError::invalid_config(format!("malformed resolution: {s}")))?;

        let width: u32 = width
            .parse()
            .map_err(|_| LapsecamError::invalid_config(format!("malformed resolution: {s}")))?;
        let height: u32 = height
            .parse()
            .map_err(|_| LapsecamError::invalid_config(format!("malformed resolution: {s}")))?;

        if width == 0 || height == 0 {
            return Err(LapsecamError::invalid_config(format!(
                "resolution dimensions must be greater than 0: {s}"
            )));
        }

        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Resolution {
    type Error = LapsecamError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Capability to produce one still image at a destination path.
#[async_trait]
pub trait FrameCapture: Send + Sync {
    /// Capture a single frame to `dest`. On failure nothing usable is left at
    /// `dest` and the tick that requested the capture is simply skipped.
    async fn capture(&self, dest: &Path, resolution: &Resolution) -> Result<()>;
}

/// Captures single frames by invoking ffmpeg against a V4L2 device.
pub struct FfmpegCapture {
    config: CameraConfig,
}

impl FfmpegCapture {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl FrameCapture for FfmpegCapture {
    async fn capture(&self, dest: &Path, resolution: &Resolution) -> Result<()> {
        debug!(
            "Capturing frame from {} at {} to {}",
            self.config.device,
            resolution,
            dest.display()
        );

        let mut command = Command::new("ffmpeg");
        command
            .arg("-y")
            .args(["-f", "v4l2"])
            .args(["-input_format", &self.config.input_format])
            .args(["-video_size", &resolution.to_string()])
            .args(["-i", &self.config.device])
            .args(["-frames:v", "1"])
            .arg(dest)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| LapsecamError::capture(format!("failed to spawn ffmpeg: {e}")))?;

        let timeout = Duration::from_secs(self.config.capture_timeout_seconds);
        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(LapsecamError::capture(format!("ffmpeg failed to run: {e}")));
            }
            Err(_) => {
                warn!(
                    "Capture timed out after {}s, killing ffmpeg",
                    self.config.capture_timeout_seconds
                );
                let _ = child.kill().await;
                return Err(LapsecamError::capture(format!(
                    "capture timed out after {}s",
                    self.config.capture_timeout_seconds
                )));
            }
        };

        if !status.success() {
            return Err(LapsecamError::capture(format!(
                "ffmpeg exited with {status}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_parsing() {
        let res: Resolution = "640x480".parse().unwrap();
        assert_eq!(res.width, 640);
        assert_eq!(res.height, 480);
        assert_eq!(res.to_string(), "640x480");
    }

    #[test]
    fn test_resolution_rejects_malformed_input() {
        assert!("640".parse::<Resolution>().is_err());
        assert!("x480".parse::<Resolution>().is_err());
        assert!("640x".parse::<Resolution>().is_err());
        assert!("640x480x3".parse::<Resolution>().is_err());
        assert!("axb".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_resolution_rejects_zero_dimensions() {
        assert!("0x480".parse::<Resolution>().is_err());
        assert!("640x0".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_resolution_serde_round_trip() {
        let res: Resolution = serde_json::from_str("\"1280x720\"").unwrap();
        assert_eq!(res.width, 1280);
        assert_eq!(serde_json::to_string(&res).unwrap(), "\"1280x720\"");
    }
}
