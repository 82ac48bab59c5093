use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_CHANGE_THRESHOLD: f64 = 3.0;
pub const DEFAULT_MAX_SILENT_MINUTES: u64 = 30;
pub const DEFAULT_SCREENSHOT_INTERVAL: u64 = 5;

/// The single logical settings instance. Mutation replaces the whole
/// record atomically via [`crate::db::Database::save_settings`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub api_base_url: String,
    pub api_key: String,
    pub vision_model: String,
    pub summary_model: String,
    /// Minutes between scheduled ticks (1–60).
    pub screenshot_interval: u64,
    /// Percentage of changed pixels below which a tick is skipped (1–20).
    pub change_threshold: f64,
    /// Minutes of no detected change after which a capture is forced (5–120).
    pub max_silent_minutes: u64,
    /// Preferred time of day for the daily summary, "HH:MM".
    pub summary_time: String,
    /// Custom vision prompt; the default template is used when blank.
    pub analysis_prompt: Option<String>,
    /// Custom summary prompt; must keep the `{records}` placeholder.
    pub summary_prompt: Option<String>,
    /// Directory the daily summary files are written into.
    pub vault_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            vision_model: "gpt-4o".to_string(),
            summary_model: "gpt-4o".to_string(),
            screenshot_interval: DEFAULT_SCREENSHOT_INTERVAL,
            change_threshold: DEFAULT_CHANGE_THRESHOLD,
            max_silent_minutes: DEFAULT_MAX_SILENT_MINUTES,
            summary_time: "18:00".to_string(),
            analysis_prompt: None,
            summary_prompt: None,
            vault_path: None,
        }
    }
}

impl Settings {
    /// Range checks applied at save time. `change_threshold` and
    /// `max_silent_minutes` are independent knobs; no ordering between
    /// them and `screenshot_interval` is enforced.
    pub fn validate(&self) -> Result<()> {
        if !(1..=60).contains(&self.screenshot_interval) {
            return Err(Error::Config(format!(
                "screenshot_interval must be 1-60 minutes, got {}",
                self.screenshot_interval
            )));
        }
        if !(1.0..=20.0).contains(&self.change_threshold) {
            return Err(Error::Config(format!(
                "change_threshold must be 1-20 percent, got {}",
                self.change_threshold
            )));
        }
        if !(5..=120).contains(&self.max_silent_minutes) {
            return Err(Error::Config(format!(
                "max_silent_minutes must be 5-120, got {}",
                self.max_silent_minutes
            )));
        }
        if NaiveTime::parse_from_str(&self.summary_time, "%H:%M").is_err() {
            return Err(Error::Config(format!(
                "summary_time must be HH:MM, got '{}'",
                self.summary_time
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.screenshot_interval * 60)
    }

    pub fn silence_window(&self) -> Duration {
        Duration::from_secs(self.max_silent_minutes * 60)
    }
}
