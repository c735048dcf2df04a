use std::path::Path;

use eframe::egui::ColorImage;

/// Largest edge of the preview shown in the resize view
pub const PREVIEW_EDGE: u32 = 160;

/// Decodes a local image into a small egui texture source.
pub fn load_preview(path: &Path) -> Option<ColorImage> {
    // Any decode failure just means no preview
    let img = match image::open(path) {
        Ok(img) => img,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "no preview");
            return None;
        }
    };
    // Downscale keeping proportions, then convert to RGBA8
    let img = img.thumbnail(PREVIEW_EDGE, PREVIEW_EDGE).to_rgba8();
    let size = [img.width() as usize, img.height() as usize];
    // Create a ColorImage from the raw RGBA bytes without premultiplying alpha
    Some(ColorImage::from_rgba_unmultiplied(size, &img))
}
