//! # Image Normalization Module
//!
//! Prepares user-submitted photos for document embedding: corrects EXIF
//! capture orientation, bounds the dimensions, lightly enhances images that
//! look like screenshots and recompresses everything to JPEG.
//!
//! Failures here are never fatal to a session; callers treat an error as
//! "skip this image" and ask the user to resend.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::{debug, warn};

/// Maximum width after normalization.
pub const MAX_WIDTH: u32 = 1200;
/// Maximum height after normalization.
pub const MAX_HEIGHT: u32 = 800;
/// JPEG quality for the final encode.
pub const JPEG_QUALITY: u8 = 85;

// Common display aspect ratios: 16:9, 16:10, 4:3, 5:4.
const SCREEN_RATIOS: [f32; 4] = [1.77, 1.6, 1.33, 1.25];
const RATIO_TOLERANCE: f32 = 0.1;
// Distinct-colour cap for the screenshot check.
const COLOR_CAP: usize = 1000;

/// Errors raised while normalizing an image.
#[derive(Debug, Clone)]
pub enum ImageError {
    /// The input could not be decoded.
    Decode(String),
    /// The output could not be encoded.
    Encode(String),
    /// Filesystem failure while reading or writing.
    Io(String),
}

impl std::fmt::Display for ImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageError::Decode(msg) => write!(f, "Image decode error: {msg}"),
            ImageError::Encode(msg) => write!(f, "Image encode error: {msg}"),
            ImageError::Io(msg) => write!(f, "Image I/O error: {msg}"),
        }
    }
}

impl std::error::Error for ImageError {}

/// Normalize `input` and write the JPEG result to `output`.
///
/// The pipeline is: decode → EXIF orientation fix → RGB coercion →
/// proportional downscale to 1200×800 → optional screenshot enhancement →
/// JPEG encode at quality 85. Images already within bounds keep their
/// dimensions.
pub fn process_image(input: &Path, output: &Path) -> Result<(), ImageError> {
    let img = image::open(input).map_err(|e| ImageError::Decode(e.to_string()))?;

    // Orientation metadata is best-effort: absent or unreadable EXIF means
    // no correction, never an error.
    let img = match exif_orientation(input) {
        Some(3) => img.rotate180(),
        Some(6) => img.rotate90(),
        Some(8) => img.rotate270(),
        _ => img,
    };

    // Drop any alpha/palette representation before the JPEG encode.
    let img = DynamicImage::ImageRgb8(img.to_rgb8());

    let (width, height) = img.dimensions();
    let img = if width > MAX_WIDTH || height > MAX_HEIGHT {
        debug!(width, height, "Downscaling image to fit {MAX_WIDTH}x{MAX_HEIGHT}");
        img.resize(MAX_WIDTH, MAX_HEIGHT, FilterType::Lanczos3)
    } else {
        img
    };

    let img = if is_screenshot(&img) {
        debug!("Screenshot heuristic matched, applying contrast/sharpness boost");
        // ~1.2x contrast, mild unsharp mask for text legibility.
        img.adjust_contrast(20.0).unsharpen(0.7, 2)
    } else {
        img
    };

    // Encode the RGB buffer directly; JPEG has no alpha channel.
    let rgb = img.to_rgb8();
    let mut out = File::create(output).map_err(|e| ImageError::Io(e.to_string()))?;
    let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder
        .encode_image(&rgb)
        .map_err(|e| ImageError::Encode(e.to_string()))?;

    Ok(())
}

/// Heuristic screenshot detector.
///
/// An image counts as a screenshot when its aspect ratio is within 0.1 of a
/// common display ratio AND it uses fewer than 1000 distinct colours
/// (counting stops at the cap).
pub fn is_screenshot(img: &DynamicImage) -> bool {
    let (width, height) = img.dimensions();
    if height == 0 {
        return false;
    }

    let ratio = width as f32 / height as f32;
    let common_ratio = SCREEN_RATIOS
        .iter()
        .any(|r| (ratio - r).abs() < RATIO_TOLERANCE);
    if !common_ratio {
        return false;
    }

    distinct_color_count(img, COLOR_CAP) < COLOR_CAP
}

/// Count distinct RGB colours, stopping once `cap` is reached.
fn distinct_color_count(img: &DynamicImage, cap: usize) -> usize {
    let mut colors: HashSet<[u8; 3]> = HashSet::new();
    for pixel in img.to_rgb8().pixels() {
        colors.insert(pixel.0);
        if colors.len() >= cap {
            break;
        }
    }
    colors.len()
}

/// Read the EXIF orientation tag (274), if any.
fn exif_orientation(path: &Path) -> Option<u32> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let data = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(data) => data,
        Err(e) => {
            // Most PNGs and many JPEGs simply carry no EXIF segment.
            debug!(path = %path.display(), error = %e, "No readable EXIF metadata");
            return None;
        }
    };

    let field = data.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    match field.value.get_uint(0) {
        Some(orientation @ 1..=8) => Some(orientation),
        other => {
            warn!(path = %path.display(), ?other, "Unexpected EXIF orientation value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn flat_image(width: u32, height: u32) -> DynamicImage {
        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            // Two-tone checkerboard, well under the colour cap.
            *pixel = if (x + y) % 2 == 0 {
                Rgb([240, 240, 240])
            } else {
                Rgb([30, 30, 30])
            };
        }
        DynamicImage::ImageRgb8(img)
    }

    fn noisy_image(width: u32, height: u32) -> DynamicImage {
        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([(x % 256) as u8, (y % 256) as u8, ((x * 7 + y * 13) % 256) as u8]);
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_screenshot_detected_for_flat_16_9() {
        assert!(is_screenshot(&flat_image(1920, 1080)));
    }

    #[test]
    fn test_photo_like_16_9_not_a_screenshot() {
        assert!(!is_screenshot(&noisy_image(1920, 1080)));
    }

    #[test]
    fn test_odd_aspect_ratio_not_a_screenshot() {
        // Few colours but nothing like a display ratio.
        assert!(!is_screenshot(&flat_image(500, 1500)));
    }

    #[test]
    fn test_distinct_color_count_respects_cap() {
        let img = noisy_image(640, 480);
        assert_eq!(distinct_color_count(&img, 100), 100);
    }
}
