use serde::Serialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::detection::RawDetection;
use crate::frame::StillImage;

/// Failure of one inference call.
///
/// Every variant is recovered the same way by the feed (logged, surfaced as
/// the transient error message, buffer kept). The classification exists for
/// logs and observability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    #[error("rate limited by inference backend")]
    RateLimited,

    #[error("inference quota exceeded")]
    QuotaExceeded,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("inference backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed inference response: {0}")]
    MalformedResponse(String),

    #[error("inference backend unavailable: {0}")]
    Unavailable(String),
}

impl InferenceError {
    /// Short label for logs.
    pub fn class(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limit",
            Self::QuotaExceeded => "quota",
            Self::PermissionDenied(_) => "permission",
            Self::Http { .. } => "http",
            Self::Transport(_) => "transport",
            Self::MalformedResponse(_) => "malformed",
            Self::Unavailable(_) => "unavailable",
        }
    }

    /// A reply that arrived but did not match the detection schema.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedResponse(_))
    }
}

/// Treat a malformed reply as an empty result. Other failures pass through.
pub fn tolerate_malformed(
    result: Result<Vec<RawDetection>, InferenceError>,
) -> Result<Vec<RawDetection>, InferenceError> {
    match result {
        Err(err) if err.is_malformed() => {
            log::warn!("inference reply ignored: {}", err);
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Per-backend counters, for the status endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackendStats {
    pub requests: u64,
    pub failures: u64,
    pub detections: u64,
    pub last_latency_ms: Option<u64>,
    pub last_error: Option<String>,
}

impl BackendStats {
    pub fn record_success(&mut self, detections: usize, latency_ms: u64) {
        self.requests += 1;
        self.detections += detections as u64;
        self.last_latency_ms = Some(latency_ms);
    }

    pub fn record_failure(&mut self, err: &InferenceError, latency_ms: u64) {
        self.requests += 1;
        self.failures += 1;
        self.last_latency_ms = Some(latency_ms);
        self.last_error = Some(err.to_string());
    }
}

/// Inference backend trait.
///
/// A backend turns one still image into zero or more raw detections. The feed
/// controller does not know which implementation it talks to.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Analyze one still.
    fn analyze(&mut self, still: &StillImage) -> Result<Vec<RawDetection>, InferenceError>;

    /// Startup reachability check; gates whether polling begins.
    fn test_connection(&mut self) -> Result<bool, InferenceError> {
        Ok(true)
    }

    fn stats(&self) -> BackendStats {
        BackendStats::default()
    }
}

/// Backend handle shared between the poll worker and one-off callers.
pub type SharedBackend = Arc<Mutex<dyn InferenceBackend>>;

pub fn share<B: InferenceBackend + 'static>(backend: B) -> SharedBackend {
    Arc::new(Mutex::new(backend))
}
