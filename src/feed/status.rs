use serde::Serialize;

use crate::detect::BackendStats;
use crate::detection::Detection;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Startup connection test not finished.
    Testing,
    Connected,
    /// Initialization failed; stays here until a manual `connect()`.
    Error,
}

/// Observable controller state for the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FeedStatus {
    pub connection: ConnectionStatus,
    /// Last error message, cleared by the next non-empty successful cycle.
    pub last_error: Option<String>,
    /// An inference call is in progress.
    pub loading: bool,
    pub frame_count: u64,
    pub cycles_completed: u64,
    pub last_inference_ms: Option<u64>,
}

impl Default for FeedStatus {
    fn default() -> Self {
        Self {
            connection: ConnectionStatus::Testing,
            last_error: None,
            loading: false,
            frame_count: 0,
            cycles_completed: 0,
            last_inference_ms: None,
        }
    }
}

/// What one `poll_cycle` did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    NotConnected,
    SourceStopped,
    /// Frame source has no non-zero dimensions yet.
    NoFrame,
    /// Request spacing not yet elapsed.
    Throttled,
    /// Another inference call is still running.
    InFlight,
    Completed { added: usize },
    Failed { message: String },
}

impl CycleOutcome {
    /// Whether inference (or frame capture) was attempted.
    pub fn attempted(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Everything the presentation layer needs in one read.
#[derive(Clone, Debug, Serialize)]
pub struct FeedSnapshot {
    pub backend: String,
    /// Display top K.
    pub detections: Vec<Detection>,
    /// Full buffer length.
    pub total: usize,
    pub status: FeedStatus,
    pub backend_stats: BackendStats,
}
