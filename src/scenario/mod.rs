//! Scenario assembly: configuration, validation and the end-to-end run.

pub mod config;
pub mod runner;

pub use config::{ConfigError, ScenarioConfig, ScenarioParams};
pub use runner::{ScenarioReport, run_scenario};
