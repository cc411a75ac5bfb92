use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Retained region of a source image, as `(left, top)` inclusive and
/// `(right, bottom)` exclusive pixel edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropBox {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn size(&self) -> ImageSize {
        ImageSize {
            width: self.width(),
            height: self.height(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Full-width box that drops `pixels` rows from the bottom edge.
///
/// Returns `None` when nothing would remain, i.e. `pixels >= height` or the
/// source has zero width.
pub fn bottom_crop_box(size: ImageSize, pixels: u32) -> Option<CropBox> {
    if size.width == 0 || pixels >= size.height {
        return None;
    }
    Some(CropBox {
        left: 0,
        top: 0,
        right: size.width,
        bottom: size.height - pixels,
    })
}

pub fn estimate_rgba_bytes(size: ImageSize) -> u64 {
    (size.width as u64)
        .saturating_mul(size.height as u64)
        .saturating_mul(4)
}
