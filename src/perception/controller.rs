use std::sync::Arc;
use std::time::Duration;

use log::info;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::models::Record;
use crate::settings::Settings;

use super::worker::{capture_loop, perform_capture, CaptureDeps, CaptureShared};

/// Scheduler run mode: Stopped -> Running -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunMode {
    Stopped,
    Running,
}

struct LoopHandle {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Owns the auto-capture lifecycle. `start` and `stop` manage the periodic
/// loop; `trigger` runs one forced cycle from the caller's context. All of
/// them share one in-flight flag, so at most one capture executes at any
/// instant.
pub struct CaptureController {
    deps: CaptureDeps,
    shared: Arc<CaptureShared>,
    worker: Mutex<Option<LoopHandle>>,
    tick_interval_override: Option<Duration>,
}

impl CaptureController {
    pub fn new(deps: CaptureDeps) -> Self {
        Self {
            deps,
            shared: Arc::new(CaptureShared::new()),
            worker: Mutex::new(None),
            tick_interval_override: None,
        }
    }

    /// Replaces the settings-derived tick interval. Test hook.
    #[cfg(test)]
    pub(crate) fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_override = Some(interval);
        self
    }

    pub async fn mode(&self) -> RunMode {
        if self.worker.lock().await.is_some() {
            RunMode::Running
        } else {
            RunMode::Stopped
        }
    }

    /// Spawns the periodic loop. Idempotent: a second call while Running is
    /// a no-op, leaving exactly one active loop.
    pub async fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return Ok(());
        }

        let settings = self.deps.db.get_settings().await?;
        ensure_api_key(&settings)?;

        // Each run establishes its own baseline; the first tick always
        // stores unconditionally.
        self.shared.clear_baseline();

        let interval = self
            .tick_interval_override
            .unwrap_or_else(|| settings.tick_interval());

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(capture_loop(
            self.deps.clone(),
            Arc::clone(&self.shared),
            interval,
            cancel_token.clone(),
        ));

        *worker = Some(LoopHandle {
            handle,
            cancel_token,
        });

        info!(
            "auto capture started, interval {} min",
            settings.screenshot_interval
        );
        Ok(())
    }

    /// Cancels the loop and waits for it to wind down. If a capture is in
    /// flight the loop only observes cancellation once it completes, so the
    /// join is deferred until then. Stopping while Stopped is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let taken = self.worker.lock().await.take();

        if let Some(LoopHandle {
            handle,
            cancel_token,
        }) = taken
        {
            cancel_token.cancel();
            handle
                .await
                .map_err(|err| Error::Capture(format!("capture loop failed to join: {err}")))?;
            info!("auto capture stopped");
        }

        Ok(())
    }

    /// One forced capture cycle: always analyzes and stores, no matter how
    /// small the change. Fails fast with `CaptureInProgress` when another
    /// capture holds the in-flight flag.
    pub async fn trigger(&self) -> Result<Record> {
        let settings = self.deps.db.get_settings().await?;
        ensure_api_key(&settings)?;

        match perform_capture(&self.deps, &self.shared, &settings, true).await? {
            Some(record) => {
                info!("manual capture stored record {}", record.id);
                Ok(record)
            }
            // A forced capture never takes the unchanged path.
            None => Err(Error::Capture("forced capture did not store".into())),
        }
    }
}

fn ensure_api_key(settings: &Settings) -> Result<()> {
    if settings.api_key.trim().is_empty() {
        return Err(Error::Config(
            "API key is not configured; set it in settings first".into(),
        ));
    }
    Ok(())
}
