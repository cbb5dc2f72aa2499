//! Bridge modules for the external tools the step drives
//!
//! This module provides bridges to:
//! - `solution`: `.sln` / `.csproj` scanning
//! - `build_tool`: msbuild, xbuild or mdtool builds of the solution's projects
//! - `nunit`: the NUnit 3 console running Xamarin.UITest assemblies
//! - `envman`: exporting step outputs to the CI environment

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::engine::outputs::{ProjectOutputMap, TestProjectOutputMap};

pub mod build_tool;
pub mod envman;
pub mod nunit;
pub mod solution;

pub use build_tool::ToolBuilder;
pub use envman::{EnvmanExporter, LogExporter, RecordingExporter};
pub use nunit::NunitConsole;
pub use solution::{ProjectFile, Solution, SolutionError, SolutionProject};

/// Errors raised by the build collaborator
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Solution error: {0}")]
    Solution(#[from] SolutionError),

    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code}")]
    CommandFailed { command: String, code: i32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No buildable project found: {0}")]
    NothingToBuild(String),
}

/// Errors raised by the test console
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("Failed to get system installed nunit3-console path: {0}")]
    NotInstalled(String),

    #[error("Console was not located before running")]
    NotLocated,

    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("nunit3-console exited with code {0}")]
    TestsFailed(i32),
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to run envman: {0}")]
    Io(#[from] std::io::Error),

    #[error("envman exited with code {0}")]
    Failed(i32),
}

/// Period during which the build ran; only outputs written inside it count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BuildWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        time >= self.start && time <= self.end
    }
}

/// Value plus the non-fatal warnings produced while computing it
#[derive(Debug)]
pub struct WithWarnings<T> {
    pub warnings: Vec<String>,
    pub result: Result<T, BuildError>,
}

impl<T> WithWarnings<T> {
    pub fn ok(value: T, warnings: Vec<String>) -> Self {
        Self {
            warnings,
            result: Ok(value),
        }
    }

    pub fn err(err: BuildError, warnings: Vec<String>) -> Self {
        Self {
            warnings,
            result: Err(err),
        }
    }
}

/// Reported once per project the builder is about to compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectBuildEvent {
    pub solution: String,
    pub project: String,
    pub is_test_project: bool,
    pub command: String,
    pub already_performed: bool,
}

/// Observes build progress; has no influence on control flow
pub trait BuildObserver: Send {
    fn on_project(&mut self, event: &ProjectBuildEvent);
}

/// Builds the solution and reports what it produced
#[async_trait]
pub trait SolutionBuilder: Send {
    /// Build every Android UI-test project and the projects it references.
    async fn build_all(
        &mut self,
        configuration: &str,
        platform: &str,
        observer: &mut dyn BuildObserver,
    ) -> WithWarnings<()>;

    fn collect_project_outputs(
        &self,
        configuration: &str,
        platform: &str,
        window: BuildWindow,
    ) -> Result<ProjectOutputMap, BuildError>;

    fn collect_test_project_outputs(
        &self,
        configuration: &str,
        platform: &str,
        window: BuildWindow,
    ) -> WithWarnings<TestProjectOutputMap>;
}

/// Everything the console needs for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestInvocation {
    pub assembly: PathBuf,
    pub result_log: PathBuf,
    pub filter: String,
    pub device_id: String,
    /// Extra variables for the console process only
    pub env: BTreeMap<String, String>,
}

/// The NUnit-style console that executes a compiled test assembly
#[async_trait]
pub trait TestConsole: Send {
    /// Find the console on the host.
    fn locate(&mut self) -> Result<PathBuf, ConsoleError>;

    fn printable_command(&self, invocation: &TestInvocation) -> String;

    async fn run(&self, invocation: &TestInvocation) -> Result<(), ConsoleError>;
}

/// Sink for the step outputs handed back to the CI system
#[async_trait]
pub trait EnvExporter: Send {
    async fn export(&mut self, key: &str, value: &str) -> Result<(), ExportError>;
}

/// Render a command line, quoting arguments that contain whitespace
pub fn printable_command_line<I, S>(program: &str, args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    std::iter::once(program.to_string())
        .chain(args.into_iter().map(|arg| {
            let arg = arg.as_ref();
            if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                format!("\"{}\"", arg)
            } else {
                arg.to_string()
            }
        }))
        .collect::<Vec<_>>()
        .join(" ")
}
