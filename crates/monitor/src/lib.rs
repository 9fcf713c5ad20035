//! Driver Monitor
//!
//! Wires sensors, the drowsiness and emergency engines, report dispatch and
//! the status server into a single frame loop.

pub mod config;
pub mod input;
pub mod logging;
pub mod orchestrator;

pub use config::{ConfigLoader, ConfigSnapshot, LoggingConfig, LoopConfig, MonitorConfig, ServerConfig};
pub use input::{InputSource, KeyboardInput, RemoteAckInput};
pub use logging::init_logging;
pub use orchestrator::{CycleOutcome, FrameLoop, LoopParts, StopReason};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}
