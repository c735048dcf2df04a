//! State behind the resize view: absolute or percentage sizing with an
//! optional aspect-ratio lock bound to the width and height fields.

use std::path::Path;

use crate::imaging::{ImageOpError, ResizeTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
    #[default]
    AbsoluteSize,
    Percentage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeForm {
    original_width: u32,
    original_height: u32,
    width: u32,
    height: u32,
    maintain_aspect_ratio: bool,
    pub mode: ResizeMode,
    pub percentage: u32,
}

/// `value * numerator / denominator` in u64, truncated and clamped to u32.
/// `None` when the denominator is zero.
fn scale(value: u32, numerator: u32, denominator: u32) -> Option<u32> {
    if denominator == 0 {
        return None;
    }
    let scaled = value as u64 * numerator as u64 / denominator as u64;
    Some(scaled.min(u32::MAX as u64) as u32)
}

impl ResizeForm {
    pub fn new(original_width: u32, original_height: u32) -> Self {
        Self {
            original_width,
            original_height,
            width: original_width,
            height: original_height,
            maintain_aspect_ratio: true,
            mode: ResizeMode::AbsoluteSize,
            percentage: 100,
        }
    }

    /// Reads the original dimensions from the image header.
    pub fn from_image(path: &Path) -> Result<Self, ImageOpError> {
        let (w, h) = image::image_dimensions(path)?;
        Ok(Self::new(w, h))
    }

    pub fn original_size(&self) -> (u32, u32) {
        (self.original_width, self.original_height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn maintain_aspect_ratio(&self) -> bool {
        self.maintain_aspect_ratio
    }

    pub fn set_width(&mut self, width: u32) {
        self.width = width;
        if self.maintain_aspect_ratio {
            if let Some(h) = scale(width, self.original_height, self.original_width) {
                self.height = h;
            }
        }
    }

    pub fn set_height(&mut self, height: u32) {
        self.height = height;
        if self.maintain_aspect_ratio {
            if let Some(w) = scale(height, self.original_width, self.original_height) {
                self.width = w;
            }
        }
    }

    /// Turning the lock on snaps the height back to the width's proportion.
    pub fn set_maintain_aspect_ratio(&mut self, maintain: bool) {
        self.maintain_aspect_ratio = maintain;
        if maintain {
            if let Some(h) = scale(self.width, self.original_height, self.original_width) {
                self.height = h;
            }
        }
    }

    pub fn target(&self) -> ResizeTarget {
        match self.mode {
            ResizeMode::AbsoluteSize => ResizeTarget {
                width: self.width,
                height: self.height,
                preserve_aspect: self.maintain_aspect_ratio,
            },
            ResizeMode::Percentage => ResizeTarget {
                width: scale(self.original_width, self.percentage, 100).unwrap_or(0),
                height: scale(self.original_height, self.percentage, 100).unwrap_or(0),
                preserve_aspect: true,
            },
        }
    }
}
