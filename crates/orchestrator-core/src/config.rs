// Copyright (c) 2025 Orchestrator Core Team
// SPDX-License-Identifier: Apache-2.0

//! Engine-wide configuration: state directory, iteration cap, log filter.

use std::path::PathBuf;

use thiserror::Error;

const ENV_STATE_DIR: &str = "ORCHESTRATOR_STATE_DIR";
const ENV_MAX_ITERATIONS: &str = "ORCHESTRATOR_MAX_ITERATIONS";
const ENV_LOG_FILTER: &str = "RUST_LOG";

const DEFAULT_STATE_DIR: &str = "./.orchestrator/runs";
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_iterations must be greater than zero")]
    ZeroMaxIterations,

    #[error("{var} is set to '{value}', which is not a valid iteration count")]
    InvalidMaxIterations { var: &'static str, value: String },
}

/// Engine-wide settings, merged from environment variables and (for the CLI)
/// command-line flags. Invalid values are rejected at construction.
#[derive(Debug, Clone)]
pub struct Settings {
    pub state_dir: PathBuf,
    pub max_iterations: u32,
    pub log_filter: String,
}

impl Settings {
    pub fn new(state_dir: impl Into<PathBuf>, max_iterations: u32, log_filter: impl Into<String>) -> Result<Self, ConfigError> {
        if max_iterations == 0 {
            return Err(ConfigError::ZeroMaxIterations);
        }
        Ok(Self { state_dir: state_dir.into(), max_iterations, log_filter: log_filter.into() })
    }

    /// Load settings from environment variables, falling back to documented
    /// defaults for anything unset.
    pub fn load() -> Result<Self, ConfigError> {
        let state_dir = std::env::var(ENV_STATE_DIR).unwrap_or_else(|_| DEFAULT_STATE_DIR.to_string());
        let log_filter = std::env::var(ENV_LOG_FILTER).unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
        let max_iterations = match std::env::var(ENV_MAX_ITERATIONS) {
            Ok(value) => value
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidMaxIterations { var: ENV_MAX_ITERATIONS, value })?,
            Err(_) => crate::engine::DEFAULT_MAX_ITERATIONS,
        };
        Self::new(state_dir, max_iterations, log_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_max_iterations_is_rejected() {
        let err = Settings::new("/tmp/runs", 0, "info").unwrap_err();
        assert!(matches!(err, ConfigError::ZeroMaxIterations));
    }

    #[test]
    fn valid_settings_are_accepted() {
        let settings = Settings::new("/tmp/runs", 1000, "info").unwrap();
        assert_eq!(settings.max_iterations, 1000);
        assert_eq!(settings.state_dir, PathBuf::from("/tmp/runs"));
    }

    #[test]
    fn load_falls_back_to_documented_defaults_when_unset() {
        std::env::remove_var(ENV_STATE_DIR);
        std::env::remove_var(ENV_MAX_ITERATIONS);
        std::env::remove_var(ENV_LOG_FILTER);
        let settings = Settings::load().unwrap();
        assert_eq!(settings.state_dir, PathBuf::from(DEFAULT_STATE_DIR));
        assert_eq!(settings.max_iterations, crate::engine::DEFAULT_MAX_ITERATIONS);
        assert_eq!(settings.log_filter, DEFAULT_LOG_FILTER);
    }
}
