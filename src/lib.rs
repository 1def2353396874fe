pub mod api;
pub mod archive;
pub mod camera;
pub mod config;
pub mod error;
pub mod session;
pub mod video;

pub use api::ApiServer;
pub use archive::{Archive, ArchiveEntry};
pub use camera::{FfmpegCapture, FrameCapture, Resolution};
pub use config::LapsecamConfig;
pub use error::{LapsecamError, Result};
pub use session::{FrameInfo, SessionConfig, SessionController, SessionSnapshot, StartReceipt};
pub use video::{FfmpegAssembler, VideoAssembler};
