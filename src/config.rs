use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroizing;

use crate::detect::backends::{
    GEMINI_DEFAULT_BASE_URL, GEMINI_DEFAULT_MODEL, GEMINI_DEFAULT_TIMEOUT,
};
use crate::detect::{BackendRegistry, SimulatedBackend};
use crate::detection::ConfidenceRange;
use crate::feed::FeedSettings;
use crate::frame::FrameSource;
use crate::ingest::{open_source, SourceSettings};

const DEFAULT_API_ADDR: &str = "127.0.0.1:8797";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FeedConfigFile {
    backend: Option<String>,
    source: Option<SourceConfigFile>,
    feed: Option<FeedSectionFile>,
    api: Option<ApiConfigFile>,
    gemini: Option<GeminiConfigFile>,
    simulation: Option<SimulationConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    frame_limit: Option<u64>,
    repeat: Option<bool>,
    timeout_ms: Option<u64>,
    max_failures: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FeedSectionFile {
    poll_interval_ms: Option<u64>,
    min_request_spacing_ms: Option<u64>,
    buffer_capacity: Option<usize>,
    max_age_ms: Option<u64>,
    sweep_interval_ms: Option<u64>,
    display_limit: Option<usize>,
    confidence_min: Option<f32>,
    confidence_max: Option<f32>,
    still_width: Option<u32>,
    still_height: Option<u32>,
    jpeg_quality: Option<u8>,
    vector_seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ApiConfigFile {
    enabled: Option<bool>,
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct GeminiConfigFile {
    /// Only present so it can be rejected with a clear message.
    api_key: Option<String>,
    api_key_path: Option<PathBuf>,
    model: Option<String>,
    base_url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SimulationConfigFile {
    seed: Option<u64>,
}

/// Which inference backend drives the feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Simulated,
    Gemini,
}

impl BackendKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simulated" | "stub" => Ok(Self::Simulated),
            "gemini" => Ok(Self::Gemini),
            other => Err(anyhow!(
                "unknown backend '{}'; expected simulated or gemini",
                other
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simulated => "simulated",
            Self::Gemini => "gemini",
        }
    }

    /// Feed tuning that suits this backend.
    pub fn default_feed(self) -> FeedSettings {
        match self {
            Self::Simulated => FeedSettings::simulated(),
            Self::Gemini => FeedSettings::remote(),
        }
    }
}

#[derive(Clone)]
pub struct GeminiSettings {
    /// Resolved from `SADE_GEMINI_API_KEY` or the key file.
    pub api_key: Option<Zeroizing<String>>,
    pub api_key_path: Option<PathBuf>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_path", &self.api_key_path)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub backend: BackendKind,
    pub source: SourceSettings,
    pub feed: FeedSettings,
    pub api_enabled: bool,
    pub api_addr: String,
    pub gemini: GeminiSettings,
    pub simulation_seed: Option<u64>,
}

impl FeedConfig {
    /// Load the optional `SADE_CONFIG` file, apply environment overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SADE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let file = file_cfg.unwrap_or_default();
        if file.gemini.as_ref().is_some_and(|g| g.api_key.is_some()) {
            return Err(anyhow!(
                "gemini.api_key is not accepted in the config file; use SADE_GEMINI_API_KEY or gemini.api_key_path"
            ));
        }
        let backend = match env_value("SADE_BACKEND") {
            Some(value) => BackendKind::parse(&value)?,
            None => match file.backend.as_deref() {
                Some(value) => BackendKind::parse(value)?,
                None => BackendKind::Simulated,
            },
        };
        let mut cfg = Self::from_file(file, backend)?;
        cfg.apply_env()?;
        cfg.resolve_api_key()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FeedConfigFile, backend: BackendKind) -> Result<Self> {
        let defaults = SourceSettings::default();
        let src = file.source.unwrap_or_default();
        let source = SourceSettings {
            url: src.url.unwrap_or(defaults.url),
            width: src.width.unwrap_or(defaults.width),
            height: src.height.unwrap_or(defaults.height),
            frame_limit: src.frame_limit.or(defaults.frame_limit),
            repeat: src.repeat.unwrap_or(defaults.repeat),
            timeout: src
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            max_failures: src.max_failures.unwrap_or(defaults.max_failures),
        };

        let mut feed = backend.default_feed();
        let section = file.feed.unwrap_or_default();
        if let Some(ms) = section.poll_interval_ms {
            feed.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = section.min_request_spacing_ms {
            feed.min_request_spacing = Duration::from_millis(ms);
        }
        if let Some(capacity) = section.buffer_capacity {
            feed.buffer_capacity = capacity;
        }
        if let Some(ms) = section.max_age_ms {
            feed.max_age = Duration::from_millis(ms);
        }
        if let Some(ms) = section.sweep_interval_ms {
            feed.sweep_interval = Duration::from_millis(ms);
        }
        if let Some(limit) = section.display_limit {
            feed.display_limit = limit;
        }
        if section.confidence_min.is_some() || section.confidence_max.is_some() {
            feed.confidence = ConfidenceRange::new(
                section.confidence_min.unwrap_or(feed.confidence.min()),
                section.confidence_max.unwrap_or(feed.confidence.max()),
            )?;
        }
        if let Some(width) = section.still_width {
            feed.still_width = width;
        }
        if let Some(height) = section.still_height {
            feed.still_height = height;
        }
        if let Some(quality) = section.jpeg_quality {
            feed.jpeg_quality = quality;
        }
        feed.vector_seed = section.vector_seed;

        let api = file.api.unwrap_or_default();
        let gemini = file.gemini.unwrap_or_default();
        Ok(Self {
            backend,
            source,
            feed,
            api_enabled: api.enabled.unwrap_or(true),
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            gemini: GeminiSettings {
                api_key: None,
                api_key_path: gemini.api_key_path,
                model: gemini
                    .model
                    .unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string()),
                base_url: gemini
                    .base_url
                    .unwrap_or_else(|| GEMINI_DEFAULT_BASE_URL.to_string()),
                timeout: gemini
                    .timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(GEMINI_DEFAULT_TIMEOUT),
            },
            simulation_seed: file.simulation.and_then(|sim| sim.seed),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_value("SADE_SOURCE_URL") {
            self.source.url = url;
        }
        if let Some(addr) = env_value("SADE_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(model) = env_value("SADE_GEMINI_MODEL") {
            self.gemini.model = model;
        }
        if let Some(path) = env_value("SADE_GEMINI_API_KEY_PATH") {
            self.gemini.api_key_path = Some(PathBuf::from(path));
        }
        if let Some(ms) = env_value("SADE_POLL_INTERVAL_MS") {
            let ms: u64 = ms.parse().map_err(|_| {
                anyhow!("SADE_POLL_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.feed.poll_interval = Duration::from_millis(ms);
        }
        if let Some(capacity) = env_value("SADE_BUFFER_CAPACITY") {
            self.feed.buffer_capacity = capacity
                .parse()
                .map_err(|_| anyhow!("SADE_BUFFER_CAPACITY must be a positive integer"))?;
        }
        Ok(())
    }

    /// `SADE_GEMINI_API_KEY` wins over the key file.
    fn resolve_api_key(&mut self) -> Result<()> {
        if let Some(key) = env_value("SADE_GEMINI_API_KEY") {
            self.gemini.api_key = Some(Zeroizing::new(key));
            return Ok(());
        }
        if let Some(path) = &self.gemini.api_key_path {
            let raw = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
                anyhow!("failed to read gemini key file {}: {}", path.display(), e)
            })?);
            let key = raw.trim();
            if key.is_empty() {
                return Err(anyhow!("gemini key file {} is empty", path.display()));
            }
            self.gemini.api_key = Some(Zeroizing::new(key.to_string()));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.feed.validate()?;
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source size must be non-zero"));
        }
        if self.api_enabled {
            self.api_addr
                .parse::<std::net::SocketAddr>()
                .map_err(|e| anyhow!("invalid api addr '{}': {}", self.api_addr, e))?;
        }
        if self.backend == BackendKind::Gemini {
            if !cfg!(feature = "backend-gemini") {
                return Err(anyhow!(
                    "gemini backend requires the backend-gemini feature"
                ));
            }
            if self.gemini.api_key.is_none() {
                return Err(anyhow!(
                    "gemini backend requires SADE_GEMINI_API_KEY or SADE_GEMINI_API_KEY_PATH"
                ));
            }
        }
        Ok(())
    }

    pub fn open_source(&self) -> Result<Box<dyn FrameSource>> {
        open_source(&self.source)
    }

    /// Registry holding the configured backend as default.
    pub fn build_backends(&self) -> Result<BackendRegistry> {
        let mut registry = BackendRegistry::new();
        match self.backend {
            BackendKind::Simulated => {
                registry.register(SimulatedBackend::new(self.simulation_seed));
            }
            BackendKind::Gemini => self.register_gemini(&mut registry)?,
        }
        registry.set_default(self.backend.as_str())?;
        Ok(registry)
    }

    #[cfg(feature = "backend-gemini")]
    fn register_gemini(&self, registry: &mut BackendRegistry) -> Result<()> {
        registry.register(self.gemini_backend()?);
        Ok(())
    }

    /// Gemini client for the configured key and model.
    #[cfg(feature = "backend-gemini")]
    pub fn gemini_backend(&self) -> Result<crate::detect::GeminiBackend> {
        use crate::detect::{GeminiBackend, GeminiConfig};

        let api_key = self
            .gemini
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("gemini api key not configured"))?;
        Ok(GeminiBackend::new(GeminiConfig {
            api_key,
            model: self.gemini.model.clone(),
            base_url: self.gemini.base_url.clone(),
            timeout: self.gemini.timeout,
        })?)
    }

    #[cfg(not(feature = "backend-gemini"))]
    fn register_gemini(&self, _registry: &mut BackendRegistry) -> Result<()> {
        Err(anyhow!("gemini backend requires the backend-gemini feature"))
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<FeedConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
