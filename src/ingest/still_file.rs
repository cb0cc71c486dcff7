//! Local still-image frame source.
//!
//! Serves frames from a local image file or a directory of stills
//! (jpg/jpeg/png), in file-name order. With `repeat` off the source reports
//! stopped once every still has been served.
//!
//! The still-file source MUST NOT:
//! - Fetch remote URLs
//! - Write frames back to disk

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, GenericImageView, RgbImage};
use std::path::{Path, PathBuf};

use crate::frame::{fit_to, FrameDimensions, FrameSource};

const STILL_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Clone, Debug)]
pub struct StillFileConfig {
    /// Local file or directory path.
    pub path: String,
    /// Cycle through the stills forever.
    pub repeat: bool,
}

pub struct StillFileSource {
    config: StillFileConfig,
    frames: Vec<DynamicImage>,
    next_index: usize,
    served: u64,
}

impl StillFileSource {
    pub fn new(config: StillFileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "still-file source only supports local paths (no URL schemes)"
            ));
        }
        Ok(Self {
            config,
            frames: Vec::new(),
            next_index: 0,
            served: 0,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for StillFileSource {
    fn name(&self) -> &str {
        &self.config.path
    }

    fn connect(&mut self) -> Result<()> {
        let paths = collect_stills(Path::new(&self.config.path))?;
        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            let image = image::open(path)
                .with_context(|| format!("failed to load still {}", path.display()))?;
            frames.push(image);
        }
        if frames.is_empty() {
            return Err(anyhow!("no stills found at {}", self.config.path));
        }
        log::info!(
            "StillFileSource: loaded {} still(s) from {}",
            frames.len(),
            self.config.path
        );
        self.frames = frames;
        self.next_index = 0;
        self.served = 0;
        Ok(())
    }

    fn dimensions(&self) -> FrameDimensions {
        if self.is_stopped() {
            return FrameDimensions::UNAVAILABLE;
        }
        let index = self.next_index % self.frames.len().max(1);
        match self.frames.get(index) {
            Some(frame) => {
                let (width, height) = frame.dimensions();
                FrameDimensions::new(width, height)
            }
            None => FrameDimensions::UNAVAILABLE,
        }
    }

    fn is_stopped(&self) -> bool {
        !self.config.repeat && !self.frames.is_empty() && self.served >= self.frames.len() as u64
    }

    fn rasterize(&mut self, width: u32, height: u32) -> Result<RgbImage> {
        if self.frames.is_empty() {
            return Err(anyhow!(
                "still-file source {} not connected; call connect() first",
                self.config.path
            ));
        }
        if self.is_stopped() {
            return Err(anyhow!("still-file source {} has ended", self.config.path));
        }
        let index = self.next_index % self.frames.len();
        let frame = fit_to(&self.frames[index], width, height);
        self.next_index = (index + 1) % self.frames.len();
        self.served += 1;
        Ok(frame)
    }
}

fn collect_stills(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(anyhow!("still path {} does not exist", path.display()));
    }
    let mut stills = Vec::new();
    for entry in std::fs::read_dir(path)
        .with_context(|| format!("failed to read still directory {}", path.display()))?
    {
        let entry_path = entry?.path();
        let is_still = entry_path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| STILL_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if entry_path.is_file() && is_still {
            stills.push(entry_path);
        }
    }
    stills.sort();
    Ok(stills)
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_still(dir: &Path, name: &str, width: u32, height: u32) {
        let rgb = RgbImage::from_pixel(width, height, image::Rgb([120, 40, 200]));
        rgb.save(dir.join(name)).unwrap();
    }

    #[test]
    fn serves_directory_stills_once() {
        let dir = tempfile::tempdir().unwrap();
        write_still(dir.path(), "b.png", 20, 10);
        write_still(dir.path(), "a.png", 30, 15);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = StillFileSource::new(StillFileConfig {
            path: dir.path().to_string_lossy().to_string(),
            repeat: false,
        })
        .unwrap();
        assert!(!source.dimensions().is_ready());
        source.connect().unwrap();
        assert_eq!(source.frame_count(), 2);
        assert_eq!(source.dimensions(), FrameDimensions::new(30, 15));

        source.rasterize(16, 16).unwrap();
        assert_eq!(source.dimensions(), FrameDimensions::new(20, 10));
        source.rasterize(16, 16).unwrap();
        assert!(source.is_stopped());
        assert!(source.rasterize(16, 16).is_err());
    }

    #[test]
    fn repeat_cycles_forever() {
        let dir = tempfile::tempdir().unwrap();
        write_still(dir.path(), "only.png", 8, 8);
        let mut source = StillFileSource::new(StillFileConfig {
            path: dir.path().join("only.png").to_string_lossy().to_string(),
            repeat: true,
        })
        .unwrap();
        source.connect().unwrap();
        for _ in 0..5 {
            source.rasterize(4, 4).unwrap();
        }
        assert!(!source.is_stopped());
    }

    #[test]
    fn rejects_urls_and_missing_paths() {
        assert!(StillFileSource::new(StillFileConfig {
            path: "http://camera/still.jpg".to_string(),
            repeat: false,
        })
        .is_err());

        let mut source = StillFileSource::new(StillFileConfig {
            path: "/definitely/not/here".to_string(),
            repeat: false,
        })
        .unwrap();
        assert!(source.connect().is_err());
    }
}
