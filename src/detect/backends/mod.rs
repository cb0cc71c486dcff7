pub mod simulated;

use std::time::Duration;

/// Gemini endpoint defaults. Available without the backend feature so
/// configuration can fill them in.
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const GEMINI_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(feature = "backend-gemini")]
pub mod gemini;

pub use simulated::SimulatedBackend;

#[cfg(feature = "backend-gemini")]
pub use gemini::{EmotionLabel, GeminiBackend, GeminiConfig, GestureLabel};
