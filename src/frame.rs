//! Frame source contract and still images.
//!
//! - `FrameSource`: anything that reports frame dimensions (0x0 until ready)
//!   and can draw its current frame into an off-screen bitmap of a requested size.
//! - `StillImage`: one sampled frame, JPEG-encoded, stamped with its capture time.
//!
//! Stills only live for the duration of one inference call. Their bytes are
//! zeroized on drop and never logged.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};
use zeroize::Zeroize;

/// Default still size handed to inference backends.
pub const DEFAULT_STILL_WIDTH: u32 = 640;
pub const DEFAULT_STILL_HEIGHT: u32 = 480;

/// Default JPEG quality (0.8 in canvas terms).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    pub const UNAVAILABLE: Self = Self {
        width: 0,
        height: 0,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A source is producing frames once both dimensions are non-zero.
    pub fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Video frame source.
pub trait FrameSource: Send {
    /// Source identifier (URL or path), for logs.
    fn name(&self) -> &str;

    /// Open the underlying stream. Sources that need no setup keep the default.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Current frame dimensions; `FrameDimensions::UNAVAILABLE` until ready.
    fn dimensions(&self) -> FrameDimensions;

    /// True once the stream has ended or the camera was stopped.
    fn is_stopped(&self) -> bool {
        false
    }

    /// Draw the current frame into a `width` x `height` RGB bitmap.
    fn rasterize(&mut self, width: u32, height: u32) -> Result<RgbImage>;
}

/// Scale an image to exactly `width` x `height`.
pub fn fit_to(image: &DynamicImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image.to_rgb8();
    }
    image::imageops::resize(&image.to_rgb8(), width, height, FilterType::Triangle)
}

/// A sampled, JPEG-encoded frame.
pub struct StillImage {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
    captured_at_ms: u64,
}

impl StillImage {
    /// Encode a rasterized frame as JPEG.
    pub fn encode(rgb: &RgbImage, quality: u8, captured_at_ms: u64) -> Result<Self> {
        if !(1..=100).contains(&quality) {
            return Err(anyhow!("jpeg quality {} must be within 1..=100", quality));
        }
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("cannot encode an empty {}x{} frame", width, height));
        }
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, quality)
            .encode_image(rgb)
            .context("encode still as jpeg")?;
        Ok(Self {
            jpeg,
            width,
            height,
            captured_at_ms,
        })
    }

    /// Wrap already-encoded JPEG bytes. The dimensions are read from the image.
    pub fn from_jpeg(jpeg: Vec<u8>, captured_at_ms: u64) -> Result<Self> {
        let decoded =
            image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg)
                .context("decode jpeg still")?;
        let (width, height) = decoded.dimensions();
        Ok(Self {
            jpeg,
            width,
            height,
            captured_at_ms,
        })
    }

    pub fn jpeg_bytes(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn captured_at_ms(&self) -> u64 {
        self.captured_at_ms
    }

    pub fn base64(&self) -> String {
        BASE64.encode(&self.jpeg)
    }

    pub fn data_uri(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.base64())
    }
}

impl std::fmt::Debug for StillImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StillImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("jpeg_len", &self.jpeg.len())
            .field("captured_at_ms", &self.captured_at_ms)
            .finish()
    }
}

impl Drop for StillImage {
    fn drop(&mut self) {
        self.jpeg.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        })
    }

    #[test]
    fn dimensions_ready_only_when_non_zero() {
        assert!(!FrameDimensions::UNAVAILABLE.is_ready());
        assert!(!FrameDimensions::new(640, 0).is_ready());
        assert!(FrameDimensions::new(640, 480).is_ready());
    }

    #[test]
    fn encode_produces_jpeg_with_dimensions() {
        let still = StillImage::encode(&gradient(64, 48), 80, 1234).unwrap();
        assert_eq!(still.width(), 64);
        assert_eq!(still.height(), 48);
        assert_eq!(still.captured_at_ms(), 1234);
        assert_eq!(&still.jpeg_bytes()[..2], &[0xFF, 0xD8]);
        assert!(still.data_uri().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn encode_rejects_bad_quality() {
        assert!(StillImage::encode(&gradient(8, 8), 0, 0).is_err());
        assert!(StillImage::encode(&gradient(8, 8), 101, 0).is_err());
    }

    #[test]
    fn from_jpeg_reads_dimensions() {
        let encoded = StillImage::encode(&gradient(32, 16), 90, 0).unwrap();
        let bytes = encoded.jpeg_bytes().to_vec();
        let still = StillImage::from_jpeg(bytes, 99).unwrap();
        assert_eq!((still.width(), still.height()), (32, 16));
        assert!(StillImage::from_jpeg(b"not a jpeg".to_vec(), 0).is_err());
    }

    #[test]
    fn fit_to_resizes_exactly() {
        let image = DynamicImage::ImageRgb8(gradient(100, 50));
        let fitted = fit_to(&image, 640, 480);
        assert_eq!(fitted.dimensions(), (640, 480));
    }
}
