use super::scheduler::{self, SchedulerContext};
use super::state::{
    unix_now, FrameInfo, SessionConfig, SessionSnapshot, SessionState, StartReceipt,
};
use crate::camera::FrameCapture;
use crate::config::{SessionTimingConfig, StorageConfig};
use crate::error::{LapsecamError, Result};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// Public operations over the single shared session. All state access goes
/// through one mutex; the lock is only ever held for field access, never
/// across an await.
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    capture: Arc<dyn FrameCapture>,
    storage: StorageConfig,
    timing: SessionTimingConfig,
}

impl SessionController {
    pub fn new(
        capture: Arc<dyn FrameCapture>,
        storage: StorageConfig,
        timing: SessionTimingConfig,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            capture,
            storage,
            timing,
        }
    }

    /// Start a new timelapse session and launch its capture loop as a
    /// background task. Does not wait for the first capture.
    pub async fn start(&self, config: SessionConfig) -> Result<StartReceipt> {
        config.validate()?;

        let session_id = Uuid::new_v4();
        let frame_dir = PathBuf::from(&self.storage.timelapse_path).join(session_id.to_string());
        let cancel = CancellationToken::new();
        let start_unix = unix_now();

        // Claim the session slot first so concurrent starts serialize here
        {
            let mut state = self.state.lock();
            if state.running {
                return Err(LapsecamError::AlreadyRunning);
            }
            state.reset();
            state.running = true;
            state.session_id = Some(session_id);
            state.config = Some(config.clone());
            state.start_time = Some(start_unix);
            state.cancel = Some(cancel.clone());
        }

        if let Err(e) = tokio::fs::create_dir_all(&frame_dir).await {
            self.state.lock().reset();
            return Err(e.into());
        }

        tokio::spawn(scheduler::run(SchedulerContext {
            state: Arc::clone(&self.state),
            capture: Arc::clone(&self.capture),
            session_id,
            config: config.clone(),
            frame_dir,
            frame_extension: self.storage.frame_extension.clone(),
            timing: self.timing.clone(),
            cancel,
            start_unix,
        }));

        info!(
            "Timelapse {} started: {}s every {}s at {}",
            session_id, config.duration, config.frequency, config.resolution
        );

        Ok(StartReceipt {
            timelapse_id: session_id,
            config,
        })
    }

    /// Signal the scheduler to terminate and reset the session state. The
    /// reset is synchronous: a status read after this returns already sees
    /// `running == false`, even though the scheduler task may still be
    /// draining an in-flight capture.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.running {
            return Err(LapsecamError::NotRunning);
        }

        let session_id = state.session_id;
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        state.reset();

        if let Some(id) = session_id {
            info!("Timelapse {} stopped", id);
        }
        Ok(())
    }

    /// Snapshot of the session plus derived progress fields. Never blocks on
    /// the scheduler.
    pub fn status(&self) -> SessionSnapshot {
        let state = self.state.lock();

        let (expected_frames, end_date) = match (&state.config, state.start_time) {
            (Some(config), Some(start)) => (
                Some(config.expected_frames()),
                Some(start + config.duration),
            ),
            _ => (None, None),
        };

        SessionSnapshot {
            running: state.running,
            timelapse_id: state.session_id,
            config: state.config.clone(),
            frames_taken: state.frames_taken,
            expected_frames,
            end_date,
            latest_frame_time: state.latest_frame_time,
        }
    }

    pub fn frame_info(&self) -> FrameInfo {
        let state = self.state.lock();
        FrameInfo {
            frames_taken: state.frames_taken,
            latest_frame_time: state.latest_frame_time,
        }
    }

    /// Path of the most recent capture, if one exists on disk.
    pub async fn latest_frame(&self) -> Result<PathBuf> {
        let path = self
            .state
            .lock()
            .latest_frame_path
            .clone()
            .ok_or(LapsecamError::NoFrameAvailable)?;

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(LapsecamError::NoFrameAvailable);
        }
        Ok(path)
    }
}
