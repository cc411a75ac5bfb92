//! Shared fixtures for the workspace conformance tests.

use std::path::Path;

use anyhow::Result;
use image::{DynamicImage, ImageBuffer, Rgba};

/// Writes a checkerboard with a semi-transparent dark square colour.
pub fn write_checkerboard(path: &Path, width: u32, height: u32) -> Result<()> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        if (x + y) % 2 == 0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([10, 10, 10, 200])
        }
    });
    DynamicImage::ImageRgba8(img).save(path)?;
    Ok(())
}
