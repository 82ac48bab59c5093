//! daylog — passive work-activity logger.
//!
//! Periodically captures the screen, skips frames that barely changed,
//! extracts semantic context from the rest via a vision model, and on
//! demand synthesizes the day's records into one narrative document.

pub mod capture;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod perception;
pub mod settings;
pub mod synthesis;

#[cfg(test)]
pub(crate) mod test_support;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use log::info;

pub use crate::capture::ScreenCapturer;
pub use crate::db::Database;
pub use crate::error::{Error, Result};
pub use crate::llm::{OpenAiClient, TextSynthesizer, VisionAnalyzer};
pub use crate::models::{Record, RecordContent, ScreenAnalysis, ScreenContext, SourceType};
pub use crate::perception::{
    CaptureController, CaptureDeps, ChangeDetector, PerceptualHash, PixelDiff, RunMode,
};
pub use crate::settings::Settings;
pub use crate::synthesis::SynthesisEngine;

/// The one owned service object. Holds the store handle, the capture
/// controller and the synthesis engine; every externally exposed operation
/// is a method here. There is no ambient singleton.
pub struct DayLogger {
    db: Database,
    controller: CaptureController,
    synthesis: SynthesisEngine,
    capturer: Arc<dyn ScreenCapturer>,
    screenshot_dir: PathBuf,
}

impl DayLogger {
    /// Wires the default OpenAI-backed stack around the given capturer,
    /// with the database and screenshots kept under `data_dir`.
    pub fn new(data_dir: &Path, capturer: Arc<dyn ScreenCapturer>) -> Result<Self> {
        let db = Database::new(data_dir.join("daylog.sqlite3"))?;
        let client = Arc::new(OpenAiClient::new());
        Self::with_components(
            db,
            data_dir.join("screenshots"),
            capturer,
            Arc::clone(&client) as Arc<dyn VisionAnalyzer>,
            client,
            Arc::new(PixelDiff),
        )
    }

    /// Full dependency injection, used by embedders that bring their own
    /// analyzer, synthesizer or diff strategy.
    pub fn with_components(
        db: Database,
        screenshot_dir: PathBuf,
        capturer: Arc<dyn ScreenCapturer>,
        analyzer: Arc<dyn VisionAnalyzer>,
        synthesizer: Arc<dyn TextSynthesizer>,
        detector: Arc<dyn ChangeDetector>,
    ) -> Result<Self> {
        let deps = CaptureDeps {
            db: db.clone(),
            capturer: Arc::clone(&capturer),
            detector,
            analyzer,
            screenshot_dir: screenshot_dir.clone(),
        };

        Ok(Self {
            controller: CaptureController::new(deps),
            synthesis: SynthesisEngine::new(db.clone(), synthesizer),
            db,
            capturer,
            screenshot_dir,
        })
    }

    pub async fn start_auto_capture(&self) -> Result<()> {
        self.controller.start().await
    }

    pub async fn stop_auto_capture(&self) -> Result<()> {
        self.controller.stop().await
    }

    pub async fn capture_mode(&self) -> RunMode {
        self.controller.mode().await
    }

    /// One forced capture+analyze+store cycle, bypassing the change
    /// threshold. Fails with `CaptureInProgress` if another capture is
    /// executing.
    pub async fn trigger_capture(&self) -> Result<Record> {
        self.controller.trigger().await
    }

    /// Captures and persists one frame without analysis or a record write.
    pub async fn take_screenshot(&self) -> Result<PathBuf> {
        let capturer = Arc::clone(&self.capturer);
        let frame = tokio::task::spawn_blocking(move || capturer.capture_frame())
            .await
            .map_err(|err| Error::Capture(format!("capture worker join failed: {err}")))??;

        let path = capture::save_frame(&self.screenshot_dir, &frame)?;
        info!("screenshot saved for preview: {}", path.display());
        Ok(path)
    }

    pub async fn get_settings(&self) -> Result<Settings> {
        self.db.get_settings().await
    }

    /// Validates and atomically replaces the settings record.
    pub async fn save_settings(&self, settings: Settings) -> Result<()> {
        settings.validate()?;
        self.db.save_settings(&settings).await
    }

    pub async fn add_quick_note(&self, text: &str) -> Result<Record> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Config("note text cannot be empty".into()));
        }

        let record = self
            .db
            .insert_record(Utc::now(), &RecordContent::Manual(text.to_string()), None)
            .await?;
        info!("quick note added as record {}", record.id);
        Ok(record)
    }

    /// Today's records (UTC day boundary), ascending by timestamp.
    pub async fn get_today_records(&self) -> Result<Vec<Record>> {
        self.db.records_for_utc_day(Utc::now().date_naive()).await
    }

    /// Raw bytes of a stored screenshot, for UI preview.
    pub fn get_screenshot(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    /// Generic text read, used to preview synthesis output.
    pub fn read_file(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Synthesizes today's records into a dated file in the vault and
    /// returns its absolute path.
    pub async fn generate_daily_summary(&self) -> Result<PathBuf> {
        self.synthesis.generate_summary().await
    }
}
