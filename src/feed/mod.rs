//! Detection feed: poll cycle, rolling buffer and eviction sweep.

mod buffer;
mod controller;
mod runner;
mod settings;
mod status;

pub use buffer::RollingBuffer;
pub use controller::FeedController;
pub use runner::{FeedHandle, FeedRunner};
pub use settings::FeedSettings;
pub use status::{ConnectionStatus, CycleOutcome, FeedSnapshot, FeedStatus};
