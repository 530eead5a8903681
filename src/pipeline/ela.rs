//! Error Level Analysis: how much does one more JPEG pass change the image?
//!
//! An untouched JPEG has already settled at its compression level, so a
//! recompression barely moves it. Pasted or retouched regions have not, and
//! light up in the difference image. The score is the mean luminance of the
//! per-channel contrast-stretched difference, 0–255.
//!
//! CPU-bound: callers run [`analyze`] under `spawn_blocking`.

use crate::config::ForensicsConfig;
use crate::output::{ManipulationReport, RiskLevel};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, RgbImage};
use std::time::Instant;
use tracing::{debug, warn};

/// Quality used when encoding the difference image for display.
const DISPLAY_QUALITY: u8 = 75;

/// Run ELA over an encoded image.
///
/// Returns `None` when the buffer cannot be decoded or re-encoded. That
/// means "analysis not performed", which is not the same as "no tampering".
pub fn analyze(bytes: &[u8], config: &ForensicsConfig) -> Option<ManipulationReport> {
    let start = Instant::now();
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(e) => {
            warn!("ELA skipped: cannot decode image: {e}");
            return None;
        }
    };

    let original = prepare(img, config).to_rgb8();
    let recompressed = match recompress(&original, config.ela_quality) {
        Ok(img) => img,
        Err(e) => {
            warn!("ELA skipped: recompression failed: {e}");
            return None;
        }
    };

    let mut diff = difference(&original, &recompressed);
    autocontrast(&mut diff);
    let ela_score = mean_luminance(&diff);

    let diff_image = match encode_jpeg(&diff, DISPLAY_QUALITY) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("ELA skipped: cannot encode difference image: {e}");
            return None;
        }
    };

    let is_edited = ela_score > config.ela_threshold;
    let risk = RiskLevel::classify(ela_score, config.ela_low_threshold, config.ela_threshold);
    debug!(
        "ELA {}x{}: score {:.2} ({}) in {}ms",
        original.width(),
        original.height(),
        ela_score,
        risk.label(),
        start.elapsed().as_millis()
    );

    Some(ManipulationReport {
        ela_score,
        is_edited,
        risk,
        diff_image,
    })
}

/// Downscale large images into the configured box, keeping aspect ratio.
fn prepare(img: DynamicImage, config: &ForensicsConfig) -> DynamicImage {
    if img.width().max(img.height()) > config.ela_downscale_trigger {
        let side = config.ela_downscale_box;
        debug!(
            "ELA: downscaling {}x{} into {side}x{side}",
            img.width(),
            img.height()
        );
        img.resize(side, side, FilterType::Lanczos3)
    } else {
        img
    }
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> image::ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).write_image(
        img.as_raw(),
        img.width(),
        img.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}

fn recompress(img: &RgbImage, quality: u8) -> image::ImageResult<RgbImage> {
    let jpeg = encode_jpeg(img, quality)?;
    Ok(image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)?.to_rgb8())
}

fn difference(a: &RgbImage, b: &RgbImage) -> RgbImage {
    let mut out = RgbImage::new(a.width(), a.height());
    for ((o, pa), pb) in out.pixels_mut().zip(a.pixels()).zip(b.pixels()) {
        for c in 0..3 {
            o.0[c] = pa.0[c].abs_diff(pb.0[c]);
        }
    }
    out
}

/// Stretch each channel so its darkest value maps to 0 and its brightest to
/// 255. A flat channel is left alone.
fn autocontrast(img: &mut RgbImage) {
    for c in 0..3 {
        let (lo, hi) = img
            .pixels()
            .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[c]), hi.max(p.0[c])));
        if hi <= lo {
            continue;
        }
        let scale = 255.0 / f64::from(hi - lo);
        let offset = -f64::from(lo) * scale;
        let lut: Vec<u8> = (0..=255u8)
            .map(|v| (f64::from(v) * scale + offset).clamp(0.0, 255.0) as u8)
            .collect();
        for p in img.pixels_mut() {
            p.0[c] = lut[p.0[c] as usize];
        }
    }
}

/// Mean of ITU-R 601 luminance.
fn mean_luminance(img: &RgbImage) -> f64 {
    let n = u64::from(img.width()) * u64::from(img.height());
    if n == 0 {
        return 0.0;
    }
    let total: u64 = img
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            (u64::from(r) * 19595 + u64::from(g) * 38470 + u64::from(b) * 7471 + 0x8000) >> 16
        })
        .sum();
    total as f64 / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbaImage};
    use std::io::Cursor;

    fn png(img: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    /// Deterministic xorshift noise.
    fn noise(w: u32, h: u32) -> RgbImage {
        let mut state: u32 = 0x9E37_79B9;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xFF) as u8
        };
        RgbImage::from_fn(w, h, |_, _| Rgb([next(), next(), next()]))
    }

    #[test]
    fn flat_gray_has_no_error_level() {
        let img = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
        let report = analyze(&png(DynamicImage::ImageRgb8(img)), &ForensicsConfig::default())
            .unwrap();
        assert!(report.ela_score < 1.5, "score {}", report.ela_score);
        assert!(!report.is_edited);
        assert_eq!(report.risk, RiskLevel::Low);
        assert!(report.diff_image.starts_with(&[0xFF, 0xD8]));
    }

    #[test]
    fn noise_scores_as_edited() {
        let bytes = png(DynamicImage::ImageRgb8(noise(64, 64)));
        let report = analyze(&bytes, &ForensicsConfig::default()).unwrap();
        assert!(report.ela_score > 25.0, "score {}", report.ela_score);
        assert!(report.is_edited);
        assert_eq!(report.risk, RiskLevel::High);
    }

    #[test]
    fn analysis_is_deterministic() {
        let bytes = png(DynamicImage::ImageRgb8(noise(48, 32)));
        let config = ForensicsConfig::default();
        let a = analyze(&bytes, &config).unwrap();
        let b = analyze(&bytes, &config).unwrap();
        assert_eq!(a.ela_score, b.ela_score);
        assert_eq!(a.diff_image, b.diff_image);
    }

    #[test]
    fn undecodable_input_is_not_analysed() {
        assert!(analyze(b"not an image", &ForensicsConfig::default()).is_none());
        assert!(analyze(&[], &ForensicsConfig::default()).is_none());
    }

    #[test]
    fn alpha_input_is_analysed() {
        let img = RgbaImage::from_pixel(32, 32, image::Rgba([200, 10, 10, 128]));
        assert!(analyze(&png(DynamicImage::ImageRgba8(img)), &ForensicsConfig::default()).is_some());
    }

    #[test]
    fn large_images_are_downscaled_into_the_box() {
        let config = ForensicsConfig::builder()
            .ela_downscale(64, 32)
            .build()
            .unwrap();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 50, Rgb([1, 2, 3])));
        let out = prepare(img, &config);
        assert_eq!((out.width(), out.height()), (32, 16));

        let small = DynamicImage::ImageRgb8(RgbImage::from_pixel(60, 10, Rgb([1, 2, 3])));
        assert_eq!(prepare(small, &config).width(), 60);
    }

    #[test]
    fn autocontrast_stretches_each_channel() {
        let mut img = RgbImage::from_vec(2, 1, vec![10, 5, 7, 20, 5, 9]).unwrap();
        autocontrast(&mut img);
        // R: 10..20 → 0..255, G flat → unchanged, B: 7..9 → 0..255.
        assert_eq!(img.as_raw(), &vec![0, 5, 0, 255, 5, 255]);
    }

    #[test]
    fn luminance_weights() {
        let white = RgbImage::from_pixel(2, 2, Rgb([255, 255, 255]));
        assert_eq!(mean_luminance(&white), 255.0);
        let red = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        assert_eq!(mean_luminance(&red), 76.0);
    }
}
