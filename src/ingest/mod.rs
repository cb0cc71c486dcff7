//! Frame sources.
//!
//! This module provides different sources for frames:
//! - Synthetic pattern (`stub://`, testing and demos)
//! - HTTP camera snapshots (`http(s)://`, feature: ingest-snapshot)
//! - Local still images (plain paths)
//!
//! All sources implement `FrameSource`. The ingestion layer MUST NOT:
//! - Store frames to disk
//! - Log frame content

#[cfg(feature = "ingest-snapshot")]
pub mod snapshot;
pub mod still_file;
pub mod synthetic;

use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::frame::FrameSource;

#[cfg(feature = "ingest-snapshot")]
pub use snapshot::{SnapshotConfig, SnapshotSource};
pub use still_file::{StillFileConfig, StillFileSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Source selection, as read from configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSettings {
    /// `stub://name`, `http(s)://…` or a local path.
    pub url: String,
    /// Native size of synthetic frames.
    pub width: u32,
    pub height: u32,
    /// Synthetic frame limit; `None` runs forever.
    pub frame_limit: Option<u64>,
    /// Cycle local stills forever.
    pub repeat: bool,
    /// Snapshot fetch timeout.
    pub timeout: Duration,
    /// Snapshot failures in a row before the source stops.
    pub max_failures: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: "stub://front_camera".to_string(),
            width: 1280,
            height: 720,
            frame_limit: None,
            repeat: true,
            timeout: Duration::from_secs(5),
            max_failures: 5,
        }
    }
}

/// Build a frame source from its URL scheme.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    let url = settings.url.trim();
    if url.starts_with("stub://") {
        let source = SyntheticSource::new(SyntheticConfig {
            url: url.to_string(),
            width: settings.width,
            height: settings.height,
            frame_limit: settings.frame_limit,
        })?;
        return Ok(Box::new(source));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        #[cfg(feature = "ingest-snapshot")]
        {
            let source = SnapshotSource::new(SnapshotConfig {
                url: url.to_string(),
                timeout: settings.timeout,
                max_failures: settings.max_failures,
            })?;
            return Ok(Box::new(source));
        }
        #[cfg(not(feature = "ingest-snapshot"))]
        {
            return Err(anyhow!("http sources require the ingest-snapshot feature"));
        }
    }
    let path = url
        .strip_prefix("file://")
        .or_else(|| url.strip_prefix("file:"))
        .unwrap_or(url);
    if path.contains("://") {
        return Err(anyhow!("unsupported frame source url '{}'", url));
    }
    Ok(Box::new(StillFileSource::new(StillFileConfig {
        path: path.to_string(),
        repeat: settings.repeat,
    })?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_by_scheme() {
        let stub = open_source(&SourceSettings::default()).unwrap();
        assert_eq!(stub.name(), "stub://front_camera");

        let file = open_source(&SourceSettings {
            url: "/tmp/stills".to_string(),
            ..SourceSettings::default()
        })
        .unwrap();
        assert_eq!(file.name(), "/tmp/stills");

        let unknown = open_source(&SourceSettings {
            url: "rtsp://camera/stream".to_string(),
            ..SourceSettings::default()
        });
        assert!(unknown.is_err());
    }
}
