//! Image normalization pipeline tests against real files on disk.

use std::path::PathBuf;

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use tempfile::TempDir;

use mipgen::image_processor::{process_image, ImageError, MAX_HEIGHT, MAX_WIDTH};

fn write_jpeg(dir: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
    let mut img = RgbImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
    }
    let path = dir.path().join(name);
    DynamicImage::ImageRgb8(img).save(&path).unwrap();
    path
}

#[test]
fn test_oversized_image_is_bounded() {
    let dir = TempDir::new().unwrap();
    let input = write_jpeg(&dir, "big.jpg", 2400, 1600);
    let output = dir.path().join("big_out.jpg");

    process_image(&input, &output).unwrap();

    let (width, height) = image::open(&output).unwrap().dimensions();
    assert_eq!((width, height), (1200, 800));
}

#[test]
fn test_downscale_preserves_aspect_ratio() {
    let dir = TempDir::new().unwrap();
    let input = write_jpeg(&dir, "wide.jpg", 1300, 700);
    let output = dir.path().join("wide_out.jpg");

    process_image(&input, &output).unwrap();

    let (width, height) = image::open(&output).unwrap().dimensions();
    assert_eq!(width, 1200);
    // 700 * 1200/1300, within a pixel of rounding.
    assert!((645..=647).contains(&height), "height was {height}");
}

#[test]
fn test_small_image_keeps_its_dimensions() {
    let dir = TempDir::new().unwrap();
    let input = write_jpeg(&dir, "small.jpg", 800, 600);
    let output = dir.path().join("small_out.jpg");

    process_image(&input, &output).unwrap();

    let (width, height) = image::open(&output).unwrap().dimensions();
    assert_eq!((width, height), (800, 600));
}

#[test]
fn test_output_is_jpeg() {
    let dir = TempDir::new().unwrap();
    let input = write_jpeg(&dir, "any.jpg", 640, 480);
    let output = dir.path().join("any_out.jpg");

    process_image(&input, &output).unwrap();

    let bytes = std::fs::read(&output).unwrap();
    // JPEG SOI marker.
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
}

#[test]
fn test_png_input_is_recompressed_to_jpeg() {
    let dir = TempDir::new().unwrap();
    let mut img = RgbImage::new(320, 240);
    for pixel in img.pixels_mut() {
        *pixel = Rgb([10, 200, 30]);
    }
    let input = dir.path().join("shot.png");
    DynamicImage::ImageRgb8(img).save(&input).unwrap();
    let output = dir.path().join("shot.jpg");

    process_image(&input, &output).unwrap();

    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
}

#[test]
fn test_undecodable_input_reports_decode_error() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("garbage.jpg");
    std::fs::write(&input, b"definitely not an image").unwrap();
    let output = dir.path().join("garbage_out.jpg");

    match process_image(&input, &output) {
        Err(ImageError::Decode(_)) => {}
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[test]
fn test_bounds_are_the_documented_ones() {
    assert_eq!(MAX_WIDTH, 1200);
    assert_eq!(MAX_HEIGHT, 800);
}
