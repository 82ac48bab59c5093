use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::Result;

/// Opaque screen-acquisition capability. Implementations return one full
/// frame as encoded PNG bytes and may block; callers run them through
/// `spawn_blocking`.
pub trait ScreenCapturer: Send + Sync {
    fn capture_frame(&self) -> Result<Vec<u8>>;
}

/// Persists a captured frame under a timestamped filename and returns the
/// path. The directory is created on first use.
pub fn save_frame(screenshot_dir: &Path, png_bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(screenshot_dir)?;

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S%.3f");
    let path = screenshot_dir.join(format!("screenshot_{timestamp}.png"));
    std::fs::write(&path, png_bytes)?;

    Ok(path)
}
