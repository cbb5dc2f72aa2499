//! Step error types

use crate::bridge::{BuildError, ConsoleError};
use crate::engine::pairing::PairingError;
use crate::step::ConfigError;

/// Conditions that end the step with a failed verdict
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Issue with input: {0}")]
    Input(#[from] ConfigError),

    #[error("{0}")]
    Tooling(#[source] ConsoleError),

    #[error("Build failed, error: {0}")]
    Build(#[source] BuildError),

    #[error("Failed to collect project outputs, error: {0}")]
    CollectProjects(#[source] BuildError),

    #[error("Failed to collect test project output, error: {0}")]
    CollectTests(#[source] BuildError),

    #[error("{0}")]
    Pairing(#[from] PairingError),

    #[error("Test failed ({test_project} against {project}), error: {source}")]
    TestFailed {
        test_project: String,
        project: String,
        #[source]
        source: ConsoleError,
    },
}
