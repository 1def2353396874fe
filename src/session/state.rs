use crate::camera::Resolution;
use crate::error::{LapsecamError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Parameters of one timelapse run. Immutable once the session starts; the
/// scheduler is handed its own copy and never re-reads shared state for them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds between captures
    pub frequency: u64,
    /// Total session length in seconds
    pub duration: u64,
    /// Resolution passed through to the capture device
    pub resolution: Resolution,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frequency == 0 {
            return Err(LapsecamError::invalid_config(
                "frequency must be greater than 0",
            ));
        }
        if self.duration == 0 {
            return Err(LapsecamError::invalid_config(
                "duration must be greater than 0",
            ));
        }
        // frequency > duration is legal and yields at most one frame
        Ok(())
    }

    pub fn expected_frames(&self) -> u64 {
        self.duration / self.frequency
    }
}

/// The single process-wide mutable session record. Shared between the
/// controller, the scheduler task and API reads behind one mutex.
#[derive(Debug, Default)]
pub struct SessionState {
    /// True iff a scheduler task is currently attached to this state
    pub running: bool,
    pub session_id: Option<Uuid>,
    pub config: Option<SessionConfig>,
    /// Wall-clock session start, unix seconds
    pub start_time: Option<u64>,
    /// Frames successfully captured in the current session
    pub frames_taken: u64,
    /// Unix seconds of the most recent successful capture
    pub latest_frame_time: Option<u64>,
    pub latest_frame_path: Option<PathBuf>,
    /// Cancellation handle for the attached scheduler task
    pub cancel: Option<CancellationToken>,
}

impl SessionState {
    /// Restore the idle invariant: not running, no config, no counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Response to a successful `start`, echoing the accepted config.
#[derive(Debug, Clone, Serialize)]
pub struct StartReceipt {
    pub timelapse_id: Uuid,
    pub config: SessionConfig,
}

/// Read-only snapshot of the session plus derived progress fields.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub running: bool,
    pub timelapse_id: Option<Uuid>,
    pub config: Option<SessionConfig>,
    pub frames_taken: u64,
    /// duration / frequency, present iff a config is active
    pub expected_frames: Option<u64>,
    /// start_time + duration (unix seconds), present iff a config is active
    pub end_date: Option<u64>,
    pub latest_frame_time: Option<u64>,
}

/// Lightweight projection for frame polling.
#[derive(Debug, Clone, Serialize)]
pub struct FrameInfo {
    pub frames_taken: u64,
    pub latest_frame_time: Option<u64>,
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
