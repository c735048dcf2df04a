//! Image operations backed by the `image` crate, and the per-item actions
//! that plug them into the batch processor.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, DynamicImage, Frame, ImageFormat};
use png::chunk::{self, ChunkType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::CancellationScope;
use crate::model::{ItemOutput, ItemResult};

#[derive(Debug, Error)]
pub enum ImageOpError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("invalid target size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("png decode error: {0}")]
    PngDecode(#[from] png::DecodingError),
    #[error("png encode error: {0}")]
    PngEncode(#[from] png::EncodingError),
}

/// Byte sizes around a lossless compression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionStats {
    pub before: u64,
    pub after: u64,
}

impl CompressionStats {
    /// Whole percent saved, truncated toward zero. 0 for empty files.
    pub fn saved_percentage(&self) -> i64 {
        if self.before == 0 {
            return 0;
        }
        ((1.0 - self.after as f64 / self.before as f64) * 100.0) as i64
    }
}

/// Formats offered by the convert view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Png,
    Jpeg,
    Bmp,
    Gif,
    Tiff,
    WebP,
    Avif,
    Ico,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 8] = [
        TargetFormat::Png,
        TargetFormat::Jpeg,
        TargetFormat::Avif,
        TargetFormat::Bmp,
        TargetFormat::Gif,
        TargetFormat::Ico,
        TargetFormat::Tiff,
        TargetFormat::WebP,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TargetFormat::Png => "PNG",
            TargetFormat::Jpeg => "JPEG",
            TargetFormat::Bmp => "BMP",
            TargetFormat::Gif => "GIF",
            TargetFormat::Tiff => "TIFF",
            TargetFormat::WebP => "WebP",
            TargetFormat::Avif => "AVIF",
            TargetFormat::Ico => "ICO",
        }
    }

    /// Lowercase format name, used as the new file extension
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Png => "png",
            TargetFormat::Jpeg => "jpeg",
            TargetFormat::Bmp => "bmp",
            TargetFormat::Gif => "gif",
            TargetFormat::Tiff => "tiff",
            TargetFormat::WebP => "webp",
            TargetFormat::Avif => "avif",
            TargetFormat::Ico => "ico",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            TargetFormat::Png => ImageFormat::Png,
            TargetFormat::Jpeg => ImageFormat::Jpeg,
            TargetFormat::Bmp => ImageFormat::Bmp,
            TargetFormat::Gif => ImageFormat::Gif,
            TargetFormat::Tiff => ImageFormat::Tiff,
            TargetFormat::WebP => ImageFormat::WebP,
            TargetFormat::Avif => ImageFormat::Avif,
            TargetFormat::Ico => ImageFormat::Ico,
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TargetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(TargetFormat::Png),
            "jpg" | "jpeg" => Ok(TargetFormat::Jpeg),
            "bmp" => Ok(TargetFormat::Bmp),
            "gif" => Ok(TargetFormat::Gif),
            "tif" | "tiff" => Ok(TargetFormat::Tiff),
            "webp" => Ok(TargetFormat::WebP),
            "avif" => Ok(TargetFormat::Avif),
            "ico" => Ok(TargetFormat::Ico),
            other => Err(format!("unknown image format '{other}'")),
        }
    }
}

/// Requested output size for a resize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeTarget {
    pub width: u32,
    pub height: u32,
    /// Fit inside width x height keeping proportions instead of stretching
    pub preserve_aspect: bool,
}

/// PNG encoder effort used by lossless compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Fast,
    Default,
    #[default]
    Best,
}

impl CompressionLevel {
    fn png_compression(self) -> png::Compression {
        match self {
            CompressionLevel::Fast => png::Compression::Fast,
            CompressionLevel::Default => png::Compression::Default,
            CompressionLevel::Best => png::Compression::Best,
        }
    }
}

/// The three image operations a batch can run
pub trait ImageOperations: Send + Sync {
    fn lossless_compress(&self, path: &Path) -> Result<CompressionStats, ImageOpError>;
    fn convert(&self, path: &Path, format: TargetFormat) -> Result<PathBuf, ImageOpError>;
    fn resize(&self, path: &Path, target: ResizeTarget) -> Result<(), ImageOpError>;
}

#[derive(Debug, Clone, Default)]
pub struct ImageCrateOps {
    pub compression: CompressionLevel,
}

impl ImageCrateOps {
    pub fn new(compression: CompressionLevel) -> Self {
        Self { compression }
    }
}

fn file_len(path: &Path) -> Result<u64, ImageOpError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ImageOpError::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

impl ImageOperations for ImageCrateOps {
    fn lossless_compress(&self, path: &Path) -> Result<CompressionStats, ImageOpError> {
        let before = file_len(path)?;

        // Formats without a lossless re-encode path are left as they are
        if ImageFormat::from_path(path).ok() != Some(ImageFormat::Png) {
            tracing::debug!(path = %path.display(), "not a png, skipping compression");
            return Ok(CompressionStats {
                before,
                after: before,
            });
        }

        let data = fs::read(path)?;
        let mut decoder = png::Decoder::new(data.as_slice());
        // Raw samples: palette, bit depth and transparency stay as stored
        decoder.set_transformations(png::Transformations::IDENTITY);
        let mut reader = decoder.read_info()?;
        let mut pixels = vec![0; reader.output_buffer_size()];
        let frame = reader.next_frame(&mut pixels)?;
        pixels.truncate(frame.buffer_size());

        // Colour profiles, text, animation and the like cannot be written back
        if let Some(kind) = png_chunks(&data).into_iter().find(|k| !is_carried(*k)) {
            tracing::debug!(
                path = %path.display(),
                chunk = %String::from_utf8_lossy(&kind.0),
                "png has metadata that would be lost, leaving it"
            );
            return Ok(CompressionStats {
                before,
                after: before,
            });
        }

        let info = reader.info();
        let mut encoded = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut encoded, info.width, info.height);
            encoder.set_color(info.color_type);
            encoder.set_depth(info.bit_depth);
            if let Some(palette) = &info.palette {
                encoder.set_palette(palette.to_vec());
            }
            if let Some(trns) = &info.trns {
                encoder.set_trns(trns.to_vec());
            }
            encoder.set_compression(self.compression.png_compression());
            encoder.set_adaptive_filter(png::AdaptiveFilterType::Adaptive);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&pixels)?;
            writer.finish()?;
        }

        if (encoded.len() as u64) < before {
            fs::write(path, &encoded)?;
        }
        let after = file_len(path)?;
        Ok(CompressionStats { before, after })
    }

    fn convert(&self, path: &Path, format: TargetFormat) -> Result<PathBuf, ImageOpError> {
        if !path.exists() {
            return Err(ImageOpError::NotFound(path.to_path_buf()));
        }
        let target = path.with_extension(format.extension());
        if target.exists() {
            tracing::info!(target = %target.display(), "converted file already exists, leaving it");
            return Ok(target);
        }

        let img = image::open(path)?;
        let img = match format {
            // No alpha channel in these encoders
            TargetFormat::Jpeg | TargetFormat::Bmp => DynamicImage::ImageRgb8(img.to_rgb8()),
            _ => img,
        };
        let mut encoded = Cursor::new(Vec::new());
        img.write_to(&mut encoded, format.image_format())?;
        fs::write(&target, encoded.into_inner())?;
        Ok(target)
    }

    fn resize(&self, path: &Path, target: ResizeTarget) -> Result<(), ImageOpError> {
        if target.width == 0 || target.height == 0 {
            return Err(ImageOpError::InvalidSize {
                width: target.width,
                height: target.height,
            });
        }
        if !path.exists() {
            return Err(ImageOpError::NotFound(path.to_path_buf()));
        }

        if ImageFormat::from_path(path).ok() == Some(ImageFormat::Gif) {
            return resize_animation(path, target);
        }

        let img = image::open(path)?;
        let resized = if target.preserve_aspect {
            img.resize(target.width, target.height, FilterType::Lanczos3)
        } else {
            img.resize_exact(target.width, target.height, FilterType::Lanczos3)
        };
        resized.save(path)?;
        Ok(())
    }
}

/// Chunk types of a PNG stream in file order, up to IEND. Empty if the
/// signature is wrong; stops early at a truncated chunk.
fn png_chunks(data: &[u8]) -> Vec<ChunkType> {
    const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    let mut chunks = Vec::new();
    let Some(mut rest) = data.strip_prefix(&SIGNATURE[..]) else {
        return chunks;
    };
    // length, type, data, crc
    while let (Some(len), Some(kind)) = (rest.get(0..4), rest.get(4..8)) {
        let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
        let kind = ChunkType([kind[0], kind[1], kind[2], kind[3]]);
        chunks.push(kind);
        if kind == chunk::IEND {
            break;
        }
        match len.checked_add(12).and_then(|end| rest.get(end..)) {
            Some(next) => rest = next,
            None => break,
        }
    }
    chunks
}

/// Chunks a plain re-encode reproduces
fn is_carried(kind: ChunkType) -> bool {
    chunk::is_critical(kind) || kind == chunk::tRNS
}

/// Resizes every frame of a GIF and re-encodes the animation in place.
/// The decoder yields frames already composited onto the full canvas.
fn resize_animation(path: &Path, target: ResizeTarget) -> Result<(), ImageOpError> {
    let decoder = GifDecoder::new(BufReader::new(File::open(path)?))?;
    let frames = decoder.into_frames().collect_frames()?;
    let Some(first) = frames.first() else {
        return Ok(());
    };

    let (width, height) = if target.preserve_aspect {
        fit_within(first.buffer().width(), first.buffer().height(), target.width, target.height)
    } else {
        (target.width, target.height)
    };

    let resized: Vec<Frame> = frames
        .iter()
        .map(|frame| {
            let buffer = imageops::resize(frame.buffer(), width, height, FilterType::Lanczos3);
            Frame::from_parts(buffer, 0, 0, frame.delay())
        })
        .collect();

    let mut encoded = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut encoded);
        encoder.set_repeat(Repeat::Infinite)?;
        encoder.encode_frames(resized)?;
    }
    fs::write(path, encoded)?;
    tracing::debug!(path = %path.display(), frames = frames.len(), "resized animation");
    Ok(())
}

/// Largest size with the source proportions that fits inside `max_w` x `max_h`
pub fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (max_w, max_h);
    }
    let ratio = f64::min(max_w as f64 / width as f64, max_h as f64 / height as f64);
    let w = ((width as f64 * ratio).round() as u32).max(1);
    let h = ((height as f64 * ratio).round() as u32).max(1);
    (w, h)
}

/// Boxed per-item action, for callers that pick the operation at runtime
pub type ItemAction = Box<dyn Fn(&Path, &CancellationScope) -> ItemResult + Send>;

/// Per-item action for the compress view
pub fn compress_action(
    ops: Arc<dyn ImageOperations>,
) -> impl Fn(&Path, &CancellationScope) -> ItemResult + Send + 'static {
    move |path: &Path, _: &CancellationScope| {
        ops.lossless_compress(path)
            .map(ItemOutput::Compressed)
            .map_err(|e| e.to_string())
    }
}

/// Per-item action for the convert view
pub fn convert_action(
    ops: Arc<dyn ImageOperations>,
    format: TargetFormat,
) -> impl Fn(&Path, &CancellationScope) -> ItemResult + Send + 'static {
    move |path: &Path, _: &CancellationScope| {
        ops.convert(path, format)
            .map(ItemOutput::Converted)
            .map_err(|e| e.to_string())
    }
}

/// Per-item action for the resize view
pub fn resize_action(
    ops: Arc<dyn ImageOperations>,
    target: ResizeTarget,
) -> impl Fn(&Path, &CancellationScope) -> ItemResult + Send + 'static {
    move |path: &Path, _: &CancellationScope| {
        ops.resize(path, target)
            .map(|()| ItemOutput::Resized)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_saved_percentage() {
        let stats = CompressionStats {
            before: 1000,
            after: 755,
        };
        assert_eq!(stats.saved_percentage(), 24);
        let none = CompressionStats {
            before: 0,
            after: 0,
        };
        assert_eq!(none.saved_percentage(), 0);
    }

    #[test]
    fn test_target_format_parse() {
        assert_eq!("JPG".parse::<TargetFormat>(), Ok(TargetFormat::Jpeg));
        assert_eq!("webp".parse::<TargetFormat>(), Ok(TargetFormat::WebP));
        assert!("eps".parse::<TargetFormat>().is_err());
        assert_eq!(TargetFormat::Tiff.extension(), "tiff");
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(1000, 500, 400, 400), (400, 200));
        assert_eq!(fit_within(500, 1000, 400, 400), (200, 400));
        assert_eq!(fit_within(10, 10, 20, 5), (5, 5));
    }

    #[test]
    fn test_resize_rejects_zero_size() {
        let ops = ImageCrateOps::default();
        let err = ops
            .resize(
                Path::new("/nonexistent/a.png"),
                ResizeTarget {
                    width: 0,
                    height: 10,
                    preserve_aspect: true,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ImageOpError::InvalidSize { .. }));
    }

    #[test]
    fn test_compress_skips_non_png() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("photo.bmp");
        RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])).save(&path).unwrap();
        let len = fs::metadata(&path).unwrap().len();

        let stats = ImageCrateOps::default().lossless_compress(&path).unwrap();
        assert_eq!(stats.before, len);
        assert_eq!(stats.after, len);
    }

    #[test]
    fn test_png_chunks() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plain.png");
        RgbImage::from_pixel(4, 4, Rgb([9, 9, 9])).save(&path).unwrap();
        let chunks = png_chunks(&fs::read(&path).unwrap());
        assert_eq!(chunks.first(), Some(&chunk::IHDR));
        assert_eq!(chunks.last(), Some(&chunk::IEND));
        assert!(chunks.iter().all(|k| is_carried(*k)));

        assert!(png_chunks(b"not a png").is_empty());
        assert!(!is_carried(chunk::gAMA));
        assert!(!is_carried(chunk::iCCP));
    }

    #[test]
    fn test_compress_missing_file() {
        let err = ImageCrateOps::default()
            .lossless_compress(Path::new("/nonexistent/x.png"))
            .unwrap_err();
        assert!(matches!(err, ImageOpError::NotFound(_)));
    }
}
