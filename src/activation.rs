//! What the panel offers for a set of dropped files

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Asset;

/// Lowercase extensions (with dot) the image backend can decode
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".tif", ".tiff", ".webp", ".ico", ".tga",
];

pub const DISPLAY_NAME: &str = "Image Helper";

/// Display name and icon the panel registers with the shell
pub struct SillDescriptor {
    pub display_name: &'static str,
    pub icon_svg: Cow<'static, [u8]>,
}

impl SillDescriptor {
    pub fn load() -> Option<Self> {
        let icon = Asset::get("image.svg")?;
        Some(Self {
            display_name: DISPLAY_NAME,
            icon_svg: icon.data,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Resize,
    Convert,
    Compress,
}

impl ViewKind {
    pub fn title(self) -> &'static str {
        match self {
            ViewKind::Resize => "Resize image",
            ViewKind::Convert => "Convert images",
            ViewKind::Compress => "Compress images",
        }
    }
}

pub fn is_supported(path: &Path) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = format!(".{}", ext.to_string_lossy().to_lowercase());
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// Supported regular files from a drop, in drop order
pub fn compatible_files<I, P>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    paths
        .into_iter()
        .map(|p| p.as_ref().to_path_buf())
        .filter(|p| !p.is_dir() && is_supported(p))
        .collect()
}

/// True if any dropped path is a supported image
pub fn should_activate<I, P>(paths: I) -> bool
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    paths
        .into_iter()
        .any(|p| !p.as_ref().is_dir() && is_supported(p.as_ref()))
}

/// Resizing is only offered for a single file
pub fn available_views(files: &[PathBuf]) -> Vec<ViewKind> {
    match files.len() {
        0 => Vec::new(),
        1 => vec![ViewKind::Resize, ViewKind::Convert, ViewKind::Compress],
        _ => vec![ViewKind::Convert, ViewKind::Compress],
    }
}
