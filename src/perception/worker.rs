use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use log::{debug, error, info};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::capture::{self, ScreenCapturer};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::llm::VisionAnalyzer;
use crate::models::{Record, RecordContent};
use crate::perception::diff::ChangeDetector;
use crate::settings::Settings;

/// Everything one capture cycle needs. Cloned into the loop task at start.
#[derive(Clone)]
pub struct CaptureDeps {
    pub db: Database,
    pub capturer: Arc<dyn ScreenCapturer>,
    pub detector: Arc<dyn ChangeDetector>,
    pub analyzer: Arc<dyn VisionAnalyzer>,
    pub screenshot_dir: PathBuf,
}

#[derive(Default)]
struct BaselineState {
    /// Last successfully stored frame, the comparison point for diffing.
    /// Diffing against the last *stored* frame (not the last captured one)
    /// keeps slow cumulative drift from hiding below the threshold.
    frame: Option<Arc<Vec<u8>>>,
    last_store_at: Option<Instant>,
}

/// In-memory capture state shared between the scheduled loop and manual
/// triggers. Never persisted; a fresh instance starts without a baseline,
/// so the first capture always stores unconditionally.
pub(crate) struct CaptureShared {
    in_flight: AtomicBool,
    baseline: Mutex<BaselineState>,
}

impl CaptureShared {
    pub(crate) fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            baseline: Mutex::new(BaselineState::default()),
        }
    }

    /// Claims the system-wide in-flight slot, or fails fast. Concurrent
    /// captures are never queued.
    fn begin(self: &Arc<Self>) -> Result<InFlightGuard> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Ok(InFlightGuard {
                shared: Arc::clone(self),
            })
        } else {
            Err(Error::CaptureInProgress)
        }
    }

    /// Drops the baseline so the next capture stores unconditionally.
    pub(crate) fn clear_baseline(&self) {
        let mut state = self.baseline.lock().unwrap();
        *state = BaselineState::default();
    }
}

struct InFlightGuard {
    shared: Arc<CaptureShared>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.shared.in_flight.store(false, Ordering::Release);
    }
}

/// One capture+analyze+store cycle. Returns `None` when the frame was
/// judged unchanged and discarded. `forced` bypasses the change-threshold
/// check entirely (manual trigger); a missing baseline has the same effect.
pub(crate) async fn perform_capture(
    deps: &CaptureDeps,
    shared: &Arc<CaptureShared>,
    settings: &Settings,
    forced: bool,
) -> Result<Option<Record>> {
    let _guard = shared.begin()?;

    let capturer = Arc::clone(&deps.capturer);
    let frame = tokio::task::spawn_blocking(move || capturer.capture_frame())
        .await
        .map_err(|err| Error::Capture(format!("capture worker join failed: {err}")))??;
    let frame = Arc::new(frame);

    let (baseline, silence_elapsed) = {
        let state = shared.baseline.lock().unwrap();
        let silence_elapsed = match state.last_store_at {
            Some(at) => at.elapsed() >= settings.silence_window(),
            None => true,
        };
        (state.frame.clone(), silence_elapsed)
    };

    if let (Some(prev), false) = (&baseline, forced) {
        let detector = Arc::clone(&deps.detector);
        let old = Arc::clone(prev);
        let new = Arc::clone(&frame);
        let diff = tokio::task::spawn_blocking(move || detector.diff_percentage(&old, &new))
            .await
            .map_err(|err| Error::Capture(format!("diff worker join failed: {err}")))??;

        debug!(
            "screen change {diff:.2}% (threshold {:.1}%)",
            settings.change_threshold
        );

        if diff < settings.change_threshold {
            if !silence_elapsed {
                return Ok(None);
            }
            info!(
                "screen unchanged but silence window ({} min) elapsed, forcing capture",
                settings.max_silent_minutes
            );
        }
    }

    let screenshot_path = match capture::save_frame(&deps.screenshot_dir, &frame) {
        Ok(path) => Some(path.to_string_lossy().into_owned()),
        Err(err) => {
            error!("failed to persist screenshot: {err}");
            None
        }
    };

    // One attempt, no retry. On failure the baseline is left untouched so
    // the next tick still diffs against the last stored frame.
    let context = deps.analyzer.analyze_frame(settings, &frame).await?;

    let record = deps
        .db
        .insert_record(Utc::now(), &RecordContent::Auto(context), screenshot_path)
        .await?;

    {
        let mut state = shared.baseline.lock().unwrap();
        state.frame = Some(Arc::clone(&frame));
        state.last_store_at = Some(Instant::now());
    }

    Ok(Some(record))
}

/// The long-lived scheduler loop. Errors in a single tick are logged and
/// swallowed; only cancellation ends the loop. Cancellation is observed
/// between ticks, so a capture already in flight runs to completion first.
pub(crate) async fn capture_loop(
    deps: CaptureDeps,
    shared: Arc<CaptureShared>,
    interval: std::time::Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                info!("capture loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let settings = match deps.db.get_settings().await {
                    Ok(settings) => settings,
                    Err(err) => {
                        error!("failed to load settings for tick: {err}");
                        continue;
                    }
                };

                match perform_capture(&deps, &shared, &settings, false).await {
                    Ok(Some(record)) => info!("auto capture stored record {}", record.id),
                    Ok(None) => debug!("screen unchanged, skipping tick"),
                    Err(Error::CaptureInProgress) => {
                        debug!("previous capture still in flight, skipping tick");
                    }
                    Err(err) => error!("auto capture tick failed: {err}"),
                }
            }
        }
    }
}
