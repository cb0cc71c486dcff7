//! HTTP snapshot frame source.
//!
//! Fetches one JPEG per rasterize call from a camera snapshot endpoint
//! (`http(s)://host/capture` style). `connect()` fetches a first snapshot to
//! learn the frame dimensions. After `max_failures` consecutive fetch errors
//! the source reports stopped, which ends the feed's poll cycle.
//!
//! The snapshot source MUST NOT:
//! - Store decoded frames to disk
//! - Log frame content

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, GenericImageView, RgbImage};
use std::io::Read;
use std::time::Duration;
use url::Url;

use crate::frame::{fit_to, FrameDimensions, FrameSource};

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct SnapshotConfig {
    /// Snapshot URL. Supported schemes: http, https.
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Consecutive fetch failures before the source reports stopped.
    pub max_failures: u32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:81/capture".to_string(),
            timeout: Duration::from_secs(5),
            max_failures: 5,
        }
    }
}

pub struct SnapshotSource {
    config: SnapshotConfig,
    agent: ureq::Agent,
    dimensions: FrameDimensions,
    consecutive_failures: u32,
    frames_fetched: u64,
}

impl SnapshotSource {
    pub fn new(config: SnapshotConfig) -> Result<Self> {
        let url = Url::parse(&config.url).context("parse snapshot url")?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported snapshot scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self {
            config,
            agent,
            dimensions: FrameDimensions::UNAVAILABLE,
            consecutive_failures: 0,
            frames_fetched: 0,
        })
    }

    pub fn frames_fetched(&self) -> u64 {
        self.frames_fetched
    }

    fn fetch(&mut self) -> Result<DynamicImage> {
        match fetch_snapshot(&self.agent, &self.config.url) {
            Ok(image) => {
                let (width, height) = image.dimensions();
                self.dimensions = FrameDimensions::new(width, height);
                self.consecutive_failures = 0;
                self.frames_fetched += 1;
                Ok(image)
            }
            Err(err) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.is_stopped() {
                    log::warn!(
                        "SnapshotSource: {} failed {} times in a row; stopping",
                        self.config.url,
                        self.consecutive_failures
                    );
                }
                Err(err)
            }
        }
    }
}

impl FrameSource for SnapshotSource {
    fn name(&self) -> &str {
        &self.config.url
    }

    fn connect(&mut self) -> Result<()> {
        self.fetch()?;
        log::info!(
            "SnapshotSource: connected to {} ({}x{})",
            self.config.url,
            self.dimensions.width,
            self.dimensions.height
        );
        Ok(())
    }

    fn dimensions(&self) -> FrameDimensions {
        if self.is_stopped() {
            FrameDimensions::UNAVAILABLE
        } else {
            self.dimensions
        }
    }

    fn is_stopped(&self) -> bool {
        self.config.max_failures > 0 && self.consecutive_failures >= self.config.max_failures
    }

    fn rasterize(&mut self, width: u32, height: u32) -> Result<RgbImage> {
        let image = self.fetch()?;
        Ok(fit_to(&image, width, height))
    }
}

fn fetch_snapshot(agent: &ureq::Agent, url: &str) -> Result<DynamicImage> {
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("fetch snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64 + 1)
        .read_to_end(&mut bytes)
        .context("read snapshot body")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty snapshot"));
    }
    if bytes.len() > MAX_JPEG_BYTES {
        return Err(anyhow!("snapshot exceeded {} bytes", MAX_JPEG_BYTES));
    }
    image::load_from_memory(&bytes).context("decode snapshot")
}
