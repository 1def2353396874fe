use thiserror::Error;

#[derive(Error, Debug)]
pub enum LapsecamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid session config: {0}")]
    InvalidConfig(String),

    #[error("Timelapse already running")]
    AlreadyRunning,

    #[error("Timelapse not running")]
    NotRunning,

    #[error("No frame available")]
    NoFrameAvailable,

    #[error("Timelapse {id} not found")]
    SessionNotFound { id: String },

    #[error("Frame capture failed: {reason}")]
    CaptureFailed { reason: String },

    #[error("Error creating video: {reason}")]
    AssemblyFailed { reason: String },

    #[error("Error deleting timelapse {id}: {source}")]
    DeletionFailed {
        id: String,
        #[source]
        source: std::io::Error,
    },
}

impl LapsecamError {
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn capture<S: Into<String>>(reason: S) -> Self {
        Self::CaptureFailed {
            reason: reason.into(),
        }
    }

    pub fn assembly<S: Into<String>>(reason: S) -> Self {
        Self::AssemblyFailed {
            reason: reason.into(),
        }
    }

    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::SessionNotFound { id: id.into() }
    }
}

pub type Result<T> = std::result::Result<T, LapsecamError>;
