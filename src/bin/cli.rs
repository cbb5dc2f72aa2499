use std::path::PathBuf;
use std::process::ExitCode;

use android_uitest_step::prelude::*;
use anyhow::Context;
use clap::builder::BoolishValueParser;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "android-uitest-step")]
#[command(about = "Build and run Xamarin Android UI tests", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a YAML file with step inputs (flags and environment win)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the Xamarin solution
    #[arg(long, env = "xamarin_project")]
    solution: Option<PathBuf>,

    /// Solution configuration to build (e.g. Release)
    #[arg(long, env = "xamarin_configuration")]
    configuration: Option<String>,

    /// Solution platform to build (e.g. "Any CPU")
    #[arg(long, env = "xamarin_platform")]
    platform: Option<String>,

    /// NUnit test filter, runs every test when empty
    #[arg(long, env = "test_to_run")]
    test_filter: Option<String>,

    /// Serial of the emulator or device to test on
    #[arg(long = "device", env = "emulator_serial")]
    device_id: Option<String>,

    /// Build tool: msbuild, xbuild or mdtool
    #[arg(long, env = "build_tool")]
    build_tool: Option<String>,

    /// Clean projects before building (yes/no)
    #[arg(long, env = "clean_build", value_parser = BoolishValueParser::new())]
    clean_build: Option<bool>,

    /// Directory receiving TestResult.xml
    #[arg(long, env = "BITRISE_DEPLOY_DIR")]
    deploy_dir: Option<PathBuf>,

    /// Path to nunit3-console, discovered when not set
    #[arg(long, env = "nunit_console_path")]
    nunit_console: Option<PathBuf>,

    /// Write a JSON run report to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            solution: self.solution.clone(),
            configuration: self.configuration.clone(),
            platform: self.platform.clone(),
            test_filter: self.test_filter.clone(),
            device_id: self.device_id.clone(),
            build_tool: self.build_tool.clone(),
            clean_build: self.clean_build,
            deploy_dir: self.deploy_dir.clone(),
            nunit_console: self.nunit_console.clone(),
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "android_uitest_step=debug"
    } else {
        "android_uitest_step=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<StepConfig> {
    let base = match &cli.config {
        Some(path) => StepConfig::load(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => StepConfig::default(),
    };
    Ok(base.with_overrides(cli.overrides()))
}

fn exporter() -> Box<dyn EnvExporter> {
    match EnvmanExporter::from_path() {
        Some(envman) => Box::new(envman),
        None => Box::new(LogExporter),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if run(cli).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

async fn run(cli: Cli) -> bool {
    let mut exporter = exporter();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Issue with input: {:#}", e);
            if let Err(e) = exporter.export(TEST_RESULT_KEY, Verdict::Failed.as_str()).await {
                tracing::warn!("Failed to export environment: {}, error: {}", TEST_RESULT_KEY, e);
            }
            return false;
        }
    };

    // an unknown tool fails validation before anything is built
    let tool = config.build_tool().unwrap_or(BuildTool::Msbuild);
    let builder = ToolBuilder::new(&config.solution, tool).with_clean(config.clean_build);
    let console = NunitConsole::new(config.nunit_console.clone());

    let report = Orchestrator::new(config, Box::new(builder), Box::new(console), exporter)
        .run()
        .await;

    if let Some(path) = &cli.report {
        if let Err(e) = report.write_json(path) {
            tracing::warn!("Failed to write run report {}: {}", path.display(), e);
        }
    }

    report.success()
}
