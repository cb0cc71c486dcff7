//! Synthetic frame source (`stub://`).
//!
//! Produces a deterministic moving pattern so the feed can run without a
//! camera. The source reports 0x0 until `connect()` is called, which mirrors a
//! camera stream that has not delivered its first frame yet.

use anyhow::{anyhow, Result};
use image::{DynamicImage, Rgb, RgbImage};

use crate::frame::{fit_to, FrameDimensions, FrameSource};

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URL, e.g. "stub://front_camera".
    pub url: String,
    /// Native frame width.
    pub width: u32,
    /// Native frame height.
    pub height: u32,
    /// Stop after this many frames. `None` runs forever.
    pub frame_limit: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 1280,
            height: 720,
            frame_limit: None,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    connected: bool,
    frame_count: u64,
    /// Simulated scene state; advances every 50 frames.
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "synthetic source expects a stub:// url, got '{}'",
                config.url
            ));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source dimensions must be non-zero"));
        }
        Ok(Self {
            config,
            connected: false,
            frame_count: 0,
            scene_state: 0,
        })
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame_count
    }

    fn render(&mut self) -> RgbImage {
        self.frame_count += 1;
        if self.frame_count.is_multiple_of(50) {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let width = self.config.width;
        let height = self.config.height;
        let block = (width.min(height) / 6).max(1);
        let offset = ((self.frame_count * 8) % width as u64) as u32;
        let tint = self.scene_state.wrapping_mul(40);

        RgbImage::from_fn(width, height, |x, y| {
            let inside_block = x.wrapping_sub(offset) < block && y >= height / 3 && y < height / 3 + block;
            if inside_block {
                Rgb([230, 230, tint])
            } else {
                Rgb([
                    ((x * 255) / width) as u8,
                    ((y * 255) / height) as u8,
                    tint,
                ])
            }
        })
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.config.url
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("SyntheticSource: connected to {} (synthetic)", self.config.url);
        Ok(())
    }

    fn dimensions(&self) -> FrameDimensions {
        if self.connected && !self.is_stopped() {
            FrameDimensions::new(self.config.width, self.config.height)
        } else {
            FrameDimensions::UNAVAILABLE
        }
    }

    fn is_stopped(&self) -> bool {
        self.config
            .frame_limit
            .is_some_and(|limit| self.frame_count >= limit)
    }

    fn rasterize(&mut self, width: u32, height: u32) -> Result<RgbImage> {
        if !self.connected {
            return Err(anyhow!(
                "synthetic source {} not connected; call connect() first",
                self.config.url
            ));
        }
        if self.is_stopped() {
            return Err(anyhow!("synthetic source {} has ended", self.config.url));
        }
        let frame = DynamicImage::ImageRgb8(self.render());
        Ok(fit_to(&frame, width, height))
    }
}
