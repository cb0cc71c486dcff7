//! SADE Detection Feed
//!
//! Periodically samples a frame source, sends a still to a pluggable
//! inference backend and keeps a bounded, time-decayed, ranked list of
//! detections for a presentation layer.
//!
//! # Architecture
//!
//! The feed holds these properties by construction:
//!
//! 1. **Bounded buffer**: never more than `buffer_capacity` detections after a cycle.
//! 2. **Freshness**: the sweep evicts every detection at or past `max_age`.
//! 3. **Clamped confidence**: displayed confidence always lies in the configured range.
//! 4. **One call in flight**: an explicit guard prevents overlapping inference calls.
//! 5. **Failures are transient**: a failed cycle keeps the buffer and the next cycle retries.
//!
//! # Module Structure
//!
//! - `frame`: Frame source contract and JPEG stills
//! - `ingest`: Frame sources (synthetic, HTTP snapshot, local stills)
//! - `detect`: Inference backends (simulated, Gemini) and reply parsing
//! - `detection`: Detection records, kind metadata, display ordering
//! - `feed`: Feed controller, rolling buffer, poll and sweep workers
//! - `api`: Loopback JSON endpoint
//! - `config`: File and environment configuration

pub mod api;
pub mod clock;
pub mod config;
pub mod detect;
pub mod detection;
pub mod feed;
pub mod frame;
pub mod ingest;

pub use api::{FeedApiConfig, FeedApiHandle, FeedApiServer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackendKind, FeedConfig};
pub use detect::{
    BackendRegistry, BackendStats, InferenceBackend, InferenceError, SharedBackend,
    SimulatedBackend,
};
pub use detection::{
    display_order, top_k, BoundingBox, ConfidenceRange, Detection, DetectionKind, Priority,
    RawDetection,
};
pub use feed::{
    ConnectionStatus, CycleOutcome, FeedController, FeedHandle, FeedRunner, FeedSettings,
    FeedSnapshot, FeedStatus, RollingBuffer,
};
pub use frame::{FrameDimensions, FrameSource, StillImage};
