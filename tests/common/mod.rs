#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use android_uitest_step::bridge::{
    BuildError, BuildObserver, BuildWindow, ConsoleError, ProjectBuildEvent, SolutionBuilder,
    TestConsole, TestInvocation, WithWarnings,
};
use android_uitest_step::engine::{
    Artifact, OutputKind, ProjectOutput, ProjectOutputMap, TestProjectOutput, TestProjectOutputMap,
};
use android_uitest_step::StepConfig;
use async_trait::async_trait;
use tempfile::TempDir;

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// A config whose solution exists and whose deploy dir is `dir`
pub fn valid_config(dir: &Path) -> StepConfig {
    let solution = dir.join("App.sln");
    fs::write(&solution, "").expect("Failed to write solution");
    StepConfig {
        solution,
        configuration: "Release".to_string(),
        platform: "Any CPU".to_string(),
        device_id: "emulator-5554".to_string(),
        deploy_dir: dir.to_path_buf(),
        ..StepConfig::default()
    }
}

pub fn app_output(apk: &str) -> ProjectOutput {
    ProjectOutput::new(vec![Artifact::new(OutputKind::Apk, apk)])
}

pub fn test_output(dll: &str, refs: &[&str]) -> TestProjectOutput {
    TestProjectOutput {
        assembly: Artifact::new(OutputKind::Dll, dll),
        referenced_projects: refs.iter().map(|r| r.to_string()).collect(),
    }
}

pub const PASSED_LOG: &str = "<test-run result=\"Passed\">\n  <test-case result=\"Passed\" />\n</test-run>\n";

pub const FAILED_LOG: &str = "<test-run result=\"Failed\">\n  <test-case result=\"Failed\">\n    <failure>\n      <message>Element not found</message>\n    </failure>\n  </test-case>\n</test-run>\n";

#[derive(Clone, Default)]
pub struct FakeBuilder {
    pub fail_build: bool,
    pub fail_collection: bool,
    pub build_warnings: Vec<String>,
    pub projects: ProjectOutputMap,
    pub tests: TestProjectOutputMap,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl FakeBuilder {
    pub fn new(projects: ProjectOutputMap, tests: TestProjectOutputMap) -> Self {
        Self {
            projects,
            tests,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl SolutionBuilder for FakeBuilder {
    async fn build_all(
        &mut self,
        _configuration: &str,
        _platform: &str,
        observer: &mut dyn BuildObserver,
    ) -> WithWarnings<()> {
        self.record("build_all");
        observer.on_project(&ProjectBuildEvent {
            solution: "App".to_string(),
            project: "App.Droid".to_string(),
            is_test_project: false,
            command: "msbuild App.Droid.csproj /t:PackageForAndroid".to_string(),
            already_performed: false,
        });

        if self.fail_build {
            WithWarnings::err(
                BuildError::CommandFailed {
                    command: "msbuild App.Droid.csproj".to_string(),
                    code: 1,
                },
                self.build_warnings.clone(),
            )
        } else {
            WithWarnings::ok((), self.build_warnings.clone())
        }
    }

    fn collect_project_outputs(
        &self,
        _configuration: &str,
        _platform: &str,
        window: BuildWindow,
    ) -> Result<ProjectOutputMap, BuildError> {
        assert!(window.start <= window.end);
        self.record("collect_project_outputs");
        if self.fail_collection {
            return Err(BuildError::NothingToBuild("fixture".to_string()));
        }
        Ok(self.projects.clone())
    }

    fn collect_test_project_outputs(
        &self,
        _configuration: &str,
        _platform: &str,
        _window: BuildWindow,
    ) -> WithWarnings<TestProjectOutputMap> {
        self.record("collect_test_project_outputs");
        WithWarnings::ok(self.tests.clone(), Vec::new())
    }
}

/// What a scripted console run does
#[derive(Clone)]
pub struct ScriptedRun {
    /// Written to the result log before returning, `None` leaves the file alone
    pub log: Option<Vec<u8>>,
    pub success: bool,
}

impl ScriptedRun {
    pub fn passing(log: &str) -> Self {
        Self {
            log: Some(log.as_bytes().to_vec()),
            success: true,
        }
    }

    pub fn failing(log: &str) -> Self {
        Self {
            log: Some(log.as_bytes().to_vec()),
            success: false,
        }
    }
}

/// Keeps every build event it is shown
#[derive(Clone, Default)]
pub struct RecordingObserver {
    pub events: Arc<Mutex<Vec<ProjectBuildEvent>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<ProjectBuildEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl BuildObserver for RecordingObserver {
    fn on_project(&mut self, event: &ProjectBuildEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[derive(Clone, Default)]
pub struct FakeConsole {
    pub missing: bool,
    pub runs: Arc<Mutex<VecDeque<ScriptedRun>>>,
    pub invocations: Arc<Mutex<Vec<TestInvocation>>>,
}

impl FakeConsole {
    pub fn scripted(runs: Vec<ScriptedRun>) -> Self {
        Self {
            runs: Arc::new(Mutex::new(runs.into())),
            ..Self::default()
        }
    }

    pub fn invocations(&self) -> Vec<TestInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl TestConsole for FakeConsole {
    fn locate(&mut self) -> Result<PathBuf, ConsoleError> {
        if self.missing {
            Err(ConsoleError::NotInstalled("nunit3-console not found".to_string()))
        } else {
            Ok(PathBuf::from("/usr/local/bin/nunit3-console"))
        }
    }

    fn printable_command(&self, invocation: &TestInvocation) -> String {
        format!("nunit3-console {}", invocation.assembly.display())
    }

    async fn run(&self, invocation: &TestInvocation) -> Result<(), ConsoleError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let run = self
            .runs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptedRun::passing(PASSED_LOG));

        if let Some(log) = &run.log {
            fs::write(&invocation.result_log, log).unwrap();
        }

        if run.success {
            Ok(())
        } else {
            Err(ConsoleError::TestsFailed(1))
        }
    }
}
