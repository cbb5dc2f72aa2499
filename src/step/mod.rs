//! Step inputs
//!
//! This module contains:
//! - `config` - Step configuration, YAML loading and input validation

pub mod config;

pub use config::{
    BuildTool, ConfigError, ConfigOverrides, LoadError, StepConfig, RESULT_LOG_FILE_NAME,
};
