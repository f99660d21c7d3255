#![allow(dead_code)]

use std::sync::Arc;

use estarfm_core::image::{Image, MultiResImages, Pixel};
use estarfm_core::options::EstarfmOptions;

pub const HIGH: &str = "high";
pub const LOW: &str = "low";
pub const DATE1: i32 = 1;
pub const DATE2: i32 = 2;
pub const DATE3: i32 = 3;

/// Deterministic, irregular integer-valued test pattern.
pub fn pattern(x: usize, y: usize, c: usize, seed: usize) -> f64 {
    ((x * 37 + y * 91 + c * 13 + seed * 53 + x * y * 7) % 101) as f64
}

/// Single-channel f64 image from `f(x, y)`.
pub fn mono(width: usize, height: usize, f: impl Fn(usize, usize) -> f64) -> Image {
    Image::from_fn(width, height, 1, |x, y, _| f(x, y))
}

/// Image of any pixel type from `f(x, y, c)`.
pub fn typed<T: Pixel>(
    width: usize,
    height: usize,
    channels: usize,
    f: impl Fn(usize, usize, usize) -> f64,
) -> Image {
    Image::from_fn(width, height, channels, |x, y, c| T::from_f64(f(x, y, c)))
}

/// Single-channel u8 mask from a predicate.
pub fn mask(width: usize, height: usize, valid: impl Fn(usize, usize) -> bool) -> Image {
    Image::from_fn(width, height, 1, |x, y, _| if valid(x, y) { 255u8 } else { 0u8 })
}

/// Register the five inputs under the default tags and dates 1, 2, 3.
pub fn registry(
    high1: Image,
    high3: Image,
    low1: Image,
    low2: Image,
    low3: Image,
) -> Arc<MultiResImages> {
    let mut images = MultiResImages::new();
    images.set(HIGH, DATE1, high1);
    images.set(HIGH, DATE3, high3);
    images.set(LOW, DATE1, low1);
    images.set(LOW, DATE2, low2);
    images.set(LOW, DATE3, low3);
    Arc::new(images)
}

pub fn options(window_size: usize) -> EstarfmOptions {
    EstarfmOptions::default()
        .with_tags(HIGH, LOW)
        .with_dates(DATE1, DATE3)
        .with_window_size(window_size)
}
