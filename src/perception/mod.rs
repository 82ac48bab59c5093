mod controller;
mod diff;
mod worker;

pub use controller::{CaptureController, RunMode};
pub use diff::{ChangeDetector, PerceptualHash, PixelDiff};
pub use worker::CaptureDeps;
