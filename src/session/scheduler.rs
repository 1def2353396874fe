use super::state::SessionState;
use crate::camera::FrameCapture;
use crate::config::SessionTimingConfig;
use crate::session::SessionConfig;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything the capture loop needs, captured at launch time so a concurrent
/// stop/start cannot change the parameters of a session already in flight.
pub(crate) struct SchedulerContext {
    pub(crate) state: Arc<Mutex<SessionState>>,
    pub(crate) capture: Arc<dyn FrameCapture>,
    pub(crate) session_id: Uuid,
    pub(crate) config: SessionConfig,
    pub(crate) frame_dir: PathBuf,
    pub(crate) frame_extension: String,
    pub(crate) timing: SessionTimingConfig,
    pub(crate) cancel: CancellationToken,
    /// Wall-clock start in unix seconds, used to stamp frame filenames
    pub(crate) start_unix: u64,
}

/// The capture loop. Runs until the configured duration elapses or the
/// session is cancelled, capturing one frame whenever the accumulated
/// `next_capture` target comes due.
pub(crate) async fn run(ctx: SchedulerContext) {
    let started = Instant::now();
    let end = started + Duration::from_secs(ctx.config.duration);
    let mut next_capture = started;
    let poll = Duration::from_millis(ctx.timing.poll_interval_ms);
    let settle = Duration::from_millis(ctx.timing.post_capture_delay_ms);

    info!(
        "Capture loop started for timelapse {} ({}s total, one frame every {}s)",
        ctx.session_id, ctx.config.duration, ctx.config.frequency
    );

    loop {
        if ctx.cancel.is_cancelled() || !session_live(&ctx.state, ctx.session_id) {
            debug!("Timelapse {} cancelled", ctx.session_id);
            break;
        }

        let now = Instant::now();
        if now >= end {
            break;
        }

        if now >= next_capture {
            // Stamps are anchored to the session's wall-clock start plus
            // monotonic elapsed time, so filenames stay strictly ordered even
            // if the system clock is adjusted mid-session.
            let stamp = ctx.start_unix + now.duration_since(started).as_secs();
            let frame_path = ctx
                .frame_dir
                .join(format!("frame_{}.{}", stamp, ctx.frame_extension));

            match ctx.capture.capture(&frame_path, &ctx.config.resolution).await {
                Ok(()) => {
                    record_frame(&ctx, stamp, frame_path);
                    // Let the capture device release before the next invocation
                    if sleep_or_cancelled(&ctx.cancel, settle).await {
                        break;
                    }
                }
                Err(e) => {
                    // One missed tick; the session itself stays alive
                    warn!("Frame capture failed, skipping tick: {}", e);
                }
            }

            // Advance the schedule regardless of outcome so slow or failed
            // captures never cause a burst of catch-up captures
            next_capture += Duration::from_secs(ctx.config.frequency);
        }

        if sleep_or_cancelled(&ctx.cancel, poll).await {
            break;
        }
    }

    finish(&ctx);
}

/// Sleep for `period`, returning true if the session was cancelled first.
async fn sleep_or_cancelled(cancel: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(period) => false,
    }
}

fn session_live(state: &Mutex<SessionState>, session_id: Uuid) -> bool {
    let state = state.lock();
    state.running && state.session_id == Some(session_id)
}

fn record_frame(ctx: &SchedulerContext, stamp: u64, frame_path: PathBuf) {
    let mut state = ctx.state.lock();
    // A stop may have reset the state while this capture was in flight;
    // committing the frame then would clobber the reset (or a newer session)
    if !state.running || state.session_id != Some(ctx.session_id) {
        return;
    }
    state.frames_taken += 1;
    state.latest_frame_time = Some(stamp);
    state.latest_frame_path = Some(frame_path);
    debug!(
        "Captured frame {} for timelapse {}",
        state.frames_taken, ctx.session_id
    );
}

/// Natural completion clears the running flag but leaves counters and config
/// readable until the next start or an explicit stop.
fn finish(ctx: &SchedulerContext) {
    let mut state = ctx.state.lock();
    if state.running && state.session_id == Some(ctx.session_id) {
        state.running = false;
        state.cancel = None;
        info!(
            "Timelapse {} completed with {} frames",
            ctx.session_id, state.frames_taken
        );
    }
}
