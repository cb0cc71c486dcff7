//! Inference backends.
//!
//! A backend takes one JPEG still and returns raw detections. The feed
//! controller clamps, stamps and ranks them; backends do none of that.

mod backend;
pub mod backends;
pub mod parse;
mod registry;

pub use backend::{
    share, tolerate_malformed, BackendStats, InferenceBackend, InferenceError, SharedBackend,
};
pub use backends::SimulatedBackend;
pub use parse::{extract_json_array, parse_detections};
pub use registry::BackendRegistry;

pub use crate::detection::RawDetection;

#[cfg(feature = "backend-gemini")]
pub use backends::{EmotionLabel, GeminiBackend, GeminiConfig, GestureLabel};
