//! Shared fakes and fixtures for in-crate tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::capture::ScreenCapturer;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::llm::{TextSynthesizer, VisionAnalyzer};
use crate::models::{ScreenAnalysis, ScreenContext};
use crate::perception::{CaptureDeps, PixelDiff};
use crate::settings::Settings;

/// Installs the test logger. Safe to call from every test; only the first
/// call wins.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Encodes a 64x64 grayscale buffer as PNG bytes.
pub fn luma_png(pixels: &[u8]) -> Vec<u8> {
    let img = image::GrayImage::from_raw(64, 64, pixels.to_vec())
        .expect("pixel buffer must be 64x64");
    let mut buf = Vec::new();
    image::DynamicImage::ImageLuma8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

pub fn solid_png(value: u8) -> Vec<u8> {
    luma_png(&vec![value; 64 * 64])
}

/// Returns frames pushed onto its queue; once drained, keeps returning the
/// most recent frame.
pub struct ScriptedCapturer {
    queue: Mutex<VecDeque<Vec<u8>>>,
    last: Mutex<Vec<u8>>,
}

impl ScriptedCapturer {
    pub fn new(first: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            last: Mutex::new(first),
        })
    }

    pub fn push(&self, frame: Vec<u8>) {
        self.queue.lock().unwrap().push_back(frame);
    }
}

impl ScreenCapturer for ScriptedCapturer {
    fn capture_frame(&self) -> Result<Vec<u8>> {
        if let Some(frame) = self.queue.lock().unwrap().pop_front() {
            *self.last.lock().unwrap() = frame.clone();
            return Ok(frame);
        }
        Ok(self.last.lock().unwrap().clone())
    }
}

pub struct FailingCapturer;

impl ScreenCapturer for FailingCapturer {
    fn capture_frame(&self) -> Result<Vec<u8>> {
        Err(Error::Capture("display unavailable".into()))
    }
}

/// Counts calls and returns a fixed structured context; can be flipped
/// into failure mode mid-test.
pub struct FakeAnalyzer {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl FakeAnalyzer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionAnalyzer for FakeAnalyzer {
    async fn analyze_frame(&self, _settings: &Settings, _png: &[u8]) -> Result<ScreenContext> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Analysis("fake analyzer failure".into()));
        }
        Ok(ScreenContext::Structured(ScreenAnalysis {
            current_focus: "running the test suite".to_string(),
            active_software: "cargo".to_string(),
            context_keywords: vec!["rust".to_string()],
        }))
    }
}

/// Blocks the first analysis call until released; later calls pass straight
/// through. Used to hold a capture mid-flight.
pub struct BlockingAnalyzer {
    pub entered: Notify,
    pub release: Notify,
    first: AtomicBool,
}

impl BlockingAnalyzer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Notify::new(),
            first: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl VisionAnalyzer for BlockingAnalyzer {
    async fn analyze_frame(&self, _settings: &Settings, _png: &[u8]) -> Result<ScreenContext> {
        if self.first.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(ScreenContext::Raw("held capture".to_string()))
    }
}

/// Records the last prompt it was given and returns a fixed output.
pub struct FakeSynthesizer {
    output: String,
    last_prompt: Mutex<String>,
}

impl FakeSynthesizer {
    pub fn new(output: &str) -> Self {
        Self {
            output: output.to_string(),
            last_prompt: Mutex::new(String::new()),
        }
    }

    pub fn last_prompt(&self) -> String {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, _settings: &Settings, prompt: &str) -> Result<String> {
        *self.last_prompt.lock().unwrap() = prompt.to_string();
        Ok(self.output.clone())
    }
}

pub struct FailingSynthesizer;

#[async_trait]
impl TextSynthesizer for FailingSynthesizer {
    async fn synthesize(&self, _settings: &Settings, _prompt: &str) -> Result<String> {
        Err(Error::SynthesisFailed("fake synthesizer failure".into()))
    }
}

/// Fresh database plus capture dependencies rooted in `dir`.
pub fn build_deps(
    dir: &Path,
    capturer: Arc<dyn ScreenCapturer>,
    analyzer: Arc<dyn VisionAnalyzer>,
) -> (Database, CaptureDeps) {
    init_test_logging();
    let db = Database::new(dir.join("daylog.sqlite3")).unwrap();
    let deps = CaptureDeps {
        db: db.clone(),
        capturer,
        detector: Arc::new(PixelDiff),
        analyzer,
        screenshot_dir: dir.join("screenshots"),
    };
    (db, deps)
}

/// Saves default settings with a usable API key, letting the test tweak
/// the rest.
pub async fn seed_settings(db: &Database, tweak: impl FnOnce(&mut Settings)) {
    let mut settings = Settings::default();
    settings.api_key = "sk-test".to_string();
    tweak(&mut settings);
    db.save_settings(&settings).await.unwrap();
}
