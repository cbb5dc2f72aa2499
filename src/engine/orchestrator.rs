//! Run Orchestrator - drives one step invocation from inputs to verdict
//!
//! The run moves through
//! `Configuring -> Building -> CollectingOutputs -> Pairing -> Testing(i) -> Reporting -> Done`
//! and drops into `Failed` from any state on the first fatal condition.
//! Everything is strictly sequential; each collaborator call is awaited
//! before the next one starts. Nothing is retried.

use chrono::Utc;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::bridge::{
    BuildObserver, BuildWindow, EnvExporter, ProjectBuildEvent, SolutionBuilder, TestConsole,
    TestInvocation,
};
use crate::engine::error::StepError;
use crate::engine::pairing::{resolve_pairings, TestPairing};
use crate::engine::result::{PairingResult, RunReport, Verdict};
use crate::engine::result_log::{
    clear_result_log, last_failure_message, read_result_log, strip_message_tags,
};
use crate::step::StepConfig;

/// Overall verdict output
pub const TEST_RESULT_KEY: &str = "BITRISE_XAMARIN_TEST_RESULT";

/// Result log text output
pub const FULL_RESULTS_KEY: &str = "BITRISE_XAMARIN_TEST_FULL_RESULTS_TEXT";

/// Tells the UITest project which package to install
pub const APK_PATH_ENV: &str = "ANDROID_APK_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Configuring,
    Building,
    CollectingOutputs,
    Pairing,
    /// Running the pairing at this index
    Testing(usize),
    Reporting,
    Done,
    Failed,
}

/// Logs each project as the builder reaches it
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl BuildObserver for LoggingObserver {
    fn on_project(&mut self, event: &ProjectBuildEvent) {
        if event.is_test_project {
            info!("Building test project: {}", event.project);
        } else {
            info!("Building project: {}", event.project);
        }

        info!("$ {}", event.command);

        if event.already_performed {
            warn!("build command already performed, skipping...");
        }
    }
}

pub struct Orchestrator {
    config: StepConfig,
    builder: Box<dyn SolutionBuilder>,
    console: Box<dyn TestConsole>,
    exporter: Box<dyn EnvExporter>,
    observer: Box<dyn BuildObserver>,
    state: RunState,
    report: RunReport,
}

impl Orchestrator {
    pub fn new(
        config: StepConfig,
        builder: Box<dyn SolutionBuilder>,
        console: Box<dyn TestConsole>,
        exporter: Box<dyn EnvExporter>,
    ) -> Self {
        Self {
            config,
            builder,
            console,
            exporter,
            observer: Box::new(LoggingObserver),
            state: RunState::Configuring,
            report: RunReport::new(),
        }
    }

    /// Replace the default logging build observer
    pub fn with_observer(mut self, observer: Box<dyn BuildObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run the step to completion and export the verdict.
    pub async fn run(mut self) -> RunReport {
        info!(run_id = %self.report.run_id, "Starting Xamarin UITest step");

        match self.execute().await {
            Ok(()) => {
                self.report.verdict = Verdict::Succeeded;
                self.export(TEST_RESULT_KEY, Verdict::Succeeded.as_str()).await;
                if !self.report.full_results.is_empty() {
                    let text = self.report.full_results.clone();
                    self.export(FULL_RESULTS_KEY, &text).await;
                }
                self.transition(RunState::Done);
            }
            Err(err) => {
                error!("{}", err);
                self.report.verdict = Verdict::Failed;
                self.export(TEST_RESULT_KEY, Verdict::Failed.as_str()).await;
                self.report.error_message = Some(err.to_string());
                self.report.error = Some(err);
                self.transition(RunState::Failed);
            }
        }

        self.report.finished_at = Some(Utc::now());
        self.report
    }

    async fn execute(&mut self) -> Result<(), StepError> {
        self.transition(RunState::Configuring);
        self.config.log_summary();
        self.config.validate()?;
        let console = self.console.locate().map_err(StepError::Tooling)?;
        info!("nunit3-console: {}", console.display());

        self.transition(RunState::Building);
        info!(
            "Building all Android Xamarin UITest and Referred Projects in solution: {}",
            self.config.solution.display()
        );
        let start = Utc::now();
        let build = self
            .builder
            .build_all(
                &self.config.configuration,
                &self.config.platform,
                self.observer.as_mut(),
            )
            .await;
        let end = Utc::now();
        self.record_warnings(build.warnings);
        build.result.map_err(StepError::Build)?;
        let window = BuildWindow::new(start, end);

        self.transition(RunState::CollectingOutputs);
        let project_outputs = self
            .builder
            .collect_project_outputs(&self.config.configuration, &self.config.platform, window)
            .map_err(StepError::CollectProjects)?;
        let test_outputs = self.builder.collect_test_project_outputs(
            &self.config.configuration,
            &self.config.platform,
            window,
        );
        self.record_warnings(test_outputs.warnings);
        let test_outputs = test_outputs.result.map_err(StepError::CollectTests)?;

        self.transition(RunState::Pairing);
        let plan = resolve_pairings(&test_outputs, &project_outputs)?;
        // already logged by the resolver
        self.report.warnings.extend(plan.warnings);

        let result_log = self.config.result_log_path();
        for (index, pairing) in plan.pairings.into_iter().enumerate() {
            self.transition(RunState::Testing(index));
            self.run_pairing(pairing, &result_log).await?;
        }

        self.transition(RunState::Reporting);
        Ok(())
    }

    async fn run_pairing(&mut self, pairing: TestPairing, result_log: &Path) -> Result<(), StepError> {
        info!(
            "Testing ({}) against ({})",
            pairing.test_project, pairing.referenced_project
        );
        info!("test dll: {}", pairing.assembly_path.display());
        info!("apk: {}", pairing.package_path.display());

        let invocation = TestInvocation {
            assembly: pairing.assembly_path.clone(),
            result_log: result_log.to_path_buf(),
            filter: self.config.test_filter.clone(),
            device_id: self.config.device_id.clone(),
            env: BTreeMap::from([(
                APK_PATH_ENV.to_string(),
                pairing.package_path.display().to_string(),
            )]),
        };

        // a run that writes nothing must not report the previous pairing's log
        if let Err(e) = clear_result_log(result_log) {
            warn!("Failed to remove previous test result, error: {}", e);
        }

        info!("Running Xamarin UITest");
        info!("$ {}", self.console.printable_command(&invocation));

        let outcome = self.console.run(&invocation).await;

        // read even after a failed run, the console may have written partial results
        self.report.full_results = match read_result_log(result_log) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read test result, error: {}", e);
                String::new()
            }
        };

        let source = match outcome {
            Ok(()) => {
                self.report.pairings.push(PairingResult {
                    pairing,
                    success: true,
                    failure_message: None,
                });
                return Ok(());
            }
            Err(source) => source,
        };

        let message = last_failure_message(&self.report.full_results);
        let failure_message = if message.is_empty() {
            None
        } else {
            let text = strip_message_tags(&message).to_string();
            error!("{}", text);
            Some(text)
        };
        self.report.failure_message = failure_message.clone();

        if !self.report.full_results.is_empty() {
            let text = self.report.full_results.clone();
            self.export(FULL_RESULTS_KEY, &text).await;
        }

        let err = StepError::TestFailed {
            test_project: pairing.test_project.clone(),
            project: pairing.referenced_project.clone(),
            source,
        };
        self.report.pairings.push(PairingResult {
            pairing,
            success: false,
            failure_message,
        });
        Err(err)
    }

    /// Best effort; a failed export never changes the outcome
    async fn export(&mut self, key: &str, value: &str) {
        if let Err(e) = self.exporter.export(key, value).await {
            warn!("Failed to export environment: {}, error: {}", key, e);
        }
    }

    fn record_warnings(&mut self, warnings: Vec<String>) {
        for warning in &warnings {
            warn!("{}", warning);
        }
        self.report.warnings.extend(warnings);
    }

    fn transition(&mut self, state: RunState) {
        debug!(from = ?self.state, to = ?state, "state transition");
        self.state = state;
    }
}
