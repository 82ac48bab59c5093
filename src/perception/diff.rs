use image::imageops::FilterType;
use image_hasher::{HashAlg, HasherConfig};

use crate::error::{Error, Result};

/// Canonical comparison resolution: 64x64 grayscale, so the diff is
/// independent of the actual display resolution.
const CANONICAL_SIZE: u32 = 64;

/// Grayscale differences at or below this are ignored (compression
/// artifacts, cursor blink).
const NOISE_TOLERANCE: u8 = 10;

/// Pure comparison of two encoded frames. Returns the percentage of the
/// screen considered changed, in [0, 100]; identical inputs yield 0.
pub trait ChangeDetector: Send + Sync {
    fn diff_percentage(&self, old_png: &[u8], new_png: &[u8]) -> Result<f64>;
}

fn decode(png_bytes: &[u8]) -> Result<image::DynamicImage> {
    image::load_from_memory(png_bytes)
        .map_err(|err| Error::Capture(format!("failed to decode frame: {err}")))
}

fn thumbnail(png_bytes: &[u8]) -> Result<Vec<u8>> {
    let img = decode(png_bytes)?;
    Ok(img
        .resize_exact(CANONICAL_SIZE, CANONICAL_SIZE, FilterType::Nearest)
        .to_luma8()
        .into_raw())
}

fn changed_percentage(a: &[u8], b: &[u8]) -> f64 {
    if a.len() != b.len() {
        return 100.0;
    }
    if a.is_empty() {
        return 0.0;
    }
    let changed = a
        .iter()
        .zip(b.iter())
        .filter(|(pa, pb)| pa.abs_diff(**pb) > NOISE_TOLERANCE)
        .count();
    (changed as f64 / a.len() as f64) * 100.0
}

/// Default strategy: per-pixel comparison on the canonical thumbnail.
pub struct PixelDiff;

impl ChangeDetector for PixelDiff {
    fn diff_percentage(&self, old_png: &[u8], new_png: &[u8]) -> Result<f64> {
        let a = thumbnail(old_png)?;
        let b = thumbnail(new_png)?;
        Ok(changed_percentage(&a, &b))
    }
}

/// Alternative strategy: double-gradient perceptual hash, Hamming distance
/// scaled to a percentage of the hash width.
pub struct PerceptualHash;

impl ChangeDetector for PerceptualHash {
    fn diff_percentage(&self, old_png: &[u8], new_png: &[u8]) -> Result<f64> {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::DoubleGradient)
            .hash_size(8, 8)
            .to_hasher();

        let h1 = hasher.hash_image(&decode(old_png)?);
        let h2 = hasher.hash_image(&decode(new_png)?);

        let bits = (h1.as_bytes().len() * 8).max(1);
        Ok((f64::from(h1.dist(&h2)) / bits as f64) * 100.0)
    }
}
