//! Shared building blocks for the devicetest harness.
//!
//! - [`error`]: error taxonomy (`DeviceTestError`, `VerificationFailure`)
//! - [`config`]: `devicetest.toml` loading with env overrides
//! - [`types`]: `RunId`, `MqttVersion`, `ScenarioKind`
//! - [`metrics`]: metric names and descriptions

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- re-exports ---

pub use config::DeviceTestConfig;
pub use error::{ConfigError, DeviceTestError, VerificationFailure};
pub use types::{MqttVersion, RunId, ScenarioKind};
