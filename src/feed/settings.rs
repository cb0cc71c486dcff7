use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::detection::ConfidenceRange;
use crate::frame::{DEFAULT_JPEG_QUALITY, DEFAULT_STILL_HEIGHT, DEFAULT_STILL_WIDTH};

/// Tuning for one feed controller.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedSettings {
    /// How often a capture + inference attempt is made.
    pub poll_interval: Duration,
    /// Minimum time between the starts of two completed inference calls.
    pub min_request_spacing: Duration,
    pub buffer_capacity: usize,
    /// Eviction horizon for buffered detections.
    pub max_age: Duration,
    pub sweep_interval: Duration,
    /// Detections shown at once by the presentation layer.
    pub display_limit: usize,
    pub confidence: ConfidenceRange,
    pub still_width: u32,
    pub still_height: u32,
    pub jpeg_quality: u8,
    /// Seed for the illustrative feature vectors; `None` draws from entropy.
    pub vector_seed: Option<u64>,
}

impl FeedSettings {
    /// Local simulation: fast polling, no throttle.
    pub fn simulated() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            min_request_spacing: Duration::ZERO,
            buffer_capacity: 20,
            max_age: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(2),
            display_limit: 8,
            confidence: ConfidenceRange::SIMULATED,
            still_width: DEFAULT_STILL_WIDTH,
            still_height: DEFAULT_STILL_HEIGHT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            vector_seed: None,
        }
    }

    /// Hosted model: slow polling, spaced requests to respect rate limits.
    pub fn remote() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            min_request_spacing: Duration::from_millis(3000),
            buffer_capacity: 12,
            max_age: Duration::from_secs(45),
            sweep_interval: Duration::from_secs(10),
            display_limit: 8,
            confidence: ConfidenceRange::REMOTE,
            ..Self::simulated()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(anyhow!("buffer capacity must be > 0"));
        }
        if self.display_limit == 0 {
            return Err(anyhow!("display limit must be > 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll interval must be > 0"));
        }
        if self.sweep_interval.is_zero() {
            return Err(anyhow!("sweep interval must be > 0"));
        }
        if self.max_age.is_zero() {
            return Err(anyhow!("max age must be > 0"));
        }
        if self.still_width == 0 || self.still_height == 0 {
            return Err(anyhow!("still size must be non-zero"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow!("jpeg quality must be in 1..=100"));
        }
        ConfidenceRange::new(self.confidence.min(), self.confidence.max())?;
        Ok(())
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self::simulated()
    }
}
