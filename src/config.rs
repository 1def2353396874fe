use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LapsecamConfig {
    pub camera: CameraConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub archive: ArchiveConfig,
    pub session: SessionTimingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera device path (e.g., /dev/video0)
    #[serde(default = "default_camera_device")]
    pub device: String,

    /// Input pixel format requested from the device
    #[serde(default = "default_input_format")]
    pub input_format: String,

    /// Resolution used when a request does not specify one
    #[serde(default = "default_resolution")]
    pub default_resolution: String,

    /// Hard cap on a single capture invocation, in seconds
    #[serde(default = "default_capture_timeout")]
    pub capture_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Base path for per-session frame directories
    #[serde(default = "default_timelapse_path")]
    pub timelapse_path: String,

    /// Scratch path for assembled videos and snapshots
    #[serde(default = "default_video_temp_path")]
    pub video_temp_path: String,

    /// File extension for captured frames
    #[serde(default = "default_frame_extension")]
    pub frame_extension: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind to
    #[serde(default = "default_server_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ArchiveConfig {
    /// Frame rate of assembled videos
    #[serde(default = "default_output_fps")]
    pub output_fps: u32,

    /// IANA timezone used when rendering archive timestamps
    #[serde(default = "default_display_timezone")]
    pub display_timezone: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionTimingConfig {
    /// Scheduler poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Settle delay after a successful capture, in milliseconds
    #[serde(default = "default_post_capture_delay_ms")]
    pub post_capture_delay_ms: u64,
}

impl LapsecamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("lapsecam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("camera.device", default_camera_device())?
            .set_default("camera.input_format", default_input_format())?
            .set_default("camera.default_resolution", default_resolution())?
            .set_default("camera.capture_timeout_seconds", default_capture_timeout())?
            .set_default("storage.timelapse_path", default_timelapse_path())?
            .set_default("storage.video_temp_path", default_video_temp_path())?
            .set_default("storage.frame_extension", default_frame_extension())?
            .set_default("server.ip", default_server_ip())?
            .set_default("server.port", default_server_port())?
            .set_default("archive.output_fps", default_output_fps())?
            .set_default("archive.display_timezone", default_display_timezone())?
            .set_default("session.poll_interval_ms", default_poll_interval_ms())?
            .set_default(
                "session.post_capture_delay_ms",
                default_post_capture_delay_ms(),
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with LAPSECAM_ prefix
            .add_source(Environment::with_prefix("LAPSECAM").separator("__"))
            .build()?;

        let config: LapsecamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.device.is_empty() {
            return Err(ConfigError::Message(
                "Camera device must not be empty".to_string(),
            ));
        }

        if self
            .camera
            .default_resolution
            .parse::<crate::camera::Resolution>()
            .is_err()
        {
            return Err(ConfigError::Message(format!(
                "Invalid default resolution: {}",
                self.camera.default_resolution
            )));
        }

        if self.camera.capture_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Capture timeout must be greater than 0".to_string(),
            ));
        }

        if self.archive.output_fps == 0 {
            return Err(ConfigError::Message(
                "Archive output fps must be greater than 0".to_string(),
            ));
        }

        if self
            .archive
            .display_timezone
            .parse::<chrono_tz::Tz>()
            .is_err()
        {
            return Err(ConfigError::Message(format!(
                "Unknown display timezone: {}",
                self.archive.display_timezone
            )));
        }

        if self.session.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Session poll interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for LapsecamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                device: default_camera_device(),
                input_format: default_input_format(),
                default_resolution: default_resolution(),
                capture_timeout_seconds: default_capture_timeout(),
            },
            storage: StorageConfig {
                timelapse_path: default_timelapse_path(),
                video_temp_path: default_video_temp_path(),
                frame_extension: default_frame_extension(),
            },
            server: ServerConfig {
                ip: default_server_ip(),
                port: default_server_port(),
            },
            archive: ArchiveConfig {
                output_fps: default_output_fps(),
                display_timezone: default_display_timezone(),
            },
            session: SessionTimingConfig {
                poll_interval_ms: default_poll_interval_ms(),
                post_capture_delay_ms: default_post_capture_delay_ms(),
            },
        }
    }
}

// Default value functions
fn default_camera_device() -> String {
    "/dev/video0".to_string()
}
fn default_input_format() -> String {
    "mjpeg".to_string()
}
fn default_resolution() -> String {
    "640x480".to_string()
}
fn default_capture_timeout() -> u64 {
    5
}

fn default_timelapse_path() -> String {
    "./timelapses".to_string()
}
fn default_video_temp_path() -> String {
    std::env::temp_dir().to_string_lossy().to_string()
}
fn default_frame_extension() -> String {
    "jpg".to_string()
}

fn default_server_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    8000
}

fn default_output_fps() -> u32 {
    30
}
fn default_display_timezone() -> String {
    "America/New_York".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}
fn default_post_capture_delay_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LapsecamConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = LapsecamConfig::load_from_file("/nonexistent/lapsecam.toml").unwrap();
        assert_eq!(config.camera.device, "/dev/video0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.archive.output_fps, 30);
    }

    #[test]
    fn test_config_validation() {
        let mut config = LapsecamConfig::default();

        config.camera.default_resolution = "garbage".to_string();
        assert!(config.validate().is_err());

        config.camera.default_resolution = "1280x720".to_string();
        assert!(config.validate().is_ok());

        config.archive.display_timezone = "Not/AZone".to_string();
        assert!(config.validate().is_err());

        config.archive.display_timezone = "UTC".to_string();
        assert!(config.validate().is_ok());

        config.camera.capture_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lapsecam.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9000\n\n[archive]\noutput_fps = 24\n",
        )
        .unwrap();

        let config = LapsecamConfig::load_from_file(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.archive.output_fps, 24);
        // Untouched sections keep their defaults
        assert_eq!(config.camera.default_resolution, "640x480");
    }
}
