//! # Android UITest Step
//!
//! A CI step that builds the Xamarin.UITest projects of a solution together
//! with the Android applications they reference, runs every test assembly
//! against every referenced APK through `nunit3-console`, and hands the
//! verdict and the NUnit result log back to the CI environment.
//!
//! ## Flow
//!
//! - **Build** - msbuild, xbuild or mdtool, one command per project
//! - **Collect** - APKs and test assemblies written during the build
//! - **Pair** - each test project with each referenced application package
//! - **Test** - one console run per pairing, stopping at the first failure
//! - **Report** - `BITRISE_XAMARIN_TEST_RESULT` and
//!   `BITRISE_XAMARIN_TEST_FULL_RESULTS_TEXT`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use android_uitest_step::prelude::*;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let config = StepConfig {
//!         solution: "./App.sln".into(),
//!         configuration: "Release".to_string(),
//!         platform: "Any CPU".to_string(),
//!         device_id: "emulator-5554".to_string(),
//!         ..StepConfig::default()
//!     };
//!
//!     let builder = ToolBuilder::new(&config.solution, BuildTool::Msbuild);
//!     let console = NunitConsole::new(None);
//!     let report = Orchestrator::new(
//!         config,
//!         Box::new(builder),
//!         Box::new(console),
//!         Box::new(LogExporter),
//!     )
//!     .run()
//!     .await;
//!
//!     println!("verdict: {}", report.verdict.as_str());
//! }
//! ```

pub mod bridge;
pub mod engine;
pub mod step;

// Re-export main types
pub use bridge::{
    BuildError, BuildObserver, BuildWindow, ConsoleError, EnvExporter, EnvmanExporter,
    ExportError, LogExporter, NunitConsole, ProjectBuildEvent, RecordingExporter,
    SolutionBuilder, TestConsole, TestInvocation, ToolBuilder, WithWarnings,
};
pub use engine::{
    Artifact, Orchestrator, OutputKind, PairingError, ProjectOutput, ProjectOutputMap, RunReport,
    RunState, StepError, TestPairing, TestProjectOutput, TestProjectOutputMap, Verdict,
};
pub use step::{BuildTool, ConfigError, ConfigOverrides, LoadError, StepConfig};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bridge::{
        EnvExporter, EnvmanExporter, LogExporter, NunitConsole, SolutionBuilder, TestConsole,
        ToolBuilder,
    };
    pub use crate::engine::{
        Orchestrator, RunReport, StepError, Verdict, FULL_RESULTS_KEY, TEST_RESULT_KEY,
    };
    pub use crate::step::{BuildTool, ConfigOverrides, StepConfig};
}
