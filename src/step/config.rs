//! Step configuration
//!
//! Configuration for a single step invocation. Values come from an optional
//! YAML file and are then overridden by CLI flags / environment variables:
//!
//! ```yaml
//! solution: ./CreditCardValidator.sln
//! configuration: Release
//! platform: Any CPU
//! test_filter: ""
//! device_id: emulator-5554
//! build_tool: msbuild
//! clean_build: true
//! deploy_dir: ./deploy
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

/// File name of the NUnit result log inside the deploy directory
pub const RESULT_LOG_FILE_NAME: &str = "TestResult.xml";

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },
}

/// Invalid or missing step input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} - path does not exist: {path}")]
    PathNotFound { field: &'static str, path: String },

    #[error("{field} - parameter not specified")]
    Empty { field: &'static str },

    #[error("{field} - invalid value: {value}, available: {allowed}")]
    InvalidOption {
        field: &'static str,
        value: String,
        allowed: String,
    },
}

/// External tool used to compile the solution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BuildTool {
    Msbuild,
    Xbuild,
    Mdtool,
}

impl BuildTool {
    pub const ALL: [BuildTool; 3] = [BuildTool::Msbuild, BuildTool::Xbuild, BuildTool::Mdtool];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildTool::Msbuild => "msbuild",
            BuildTool::Xbuild => "xbuild",
            BuildTool::Mdtool => "mdtool",
        }
    }
}

impl fmt::Display for BuildTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildTool {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuildTool::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| ConfigError::InvalidOption {
                field: "BuildTool",
                value: s.to_string(),
                allowed: BuildTool::ALL
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Immutable snapshot of the step inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default)]
    pub solution: PathBuf,

    #[serde(default)]
    pub configuration: String,

    #[serde(default)]
    pub platform: String,

    /// NUnit `--test` expression; empty runs everything
    #[serde(default)]
    pub test_filter: String,

    /// Serial of the emulator or device the tests run against
    #[serde(default)]
    pub device_id: String,

    /// Raw tool name, checked by [`StepConfig::validate`]
    #[serde(default = "default_build_tool")]
    pub build_tool: String,

    /// Clean the selected projects before building
    #[serde(default = "default_clean_build")]
    pub clean_build: bool,

    #[serde(default = "default_deploy_dir")]
    pub deploy_dir: PathBuf,

    /// Explicit nunit3-console path, skips discovery when set
    #[serde(default)]
    pub nunit_console: Option<PathBuf>,
}

fn default_build_tool() -> String {
    BuildTool::Msbuild.as_str().to_string()
}

fn default_clean_build() -> bool {
    true
}

fn default_deploy_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            solution: PathBuf::new(),
            configuration: String::new(),
            platform: String::new(),
            test_filter: String::new(),
            device_id: String::new(),
            build_tool: default_build_tool(),
            clean_build: default_clean_build(),
            deploy_dir: default_deploy_dir(),
            nunit_console: None,
        }
    }
}

/// Values supplied on the command line or through the environment.
/// `None` keeps whatever the file (or the default) provided.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub solution: Option<PathBuf>,
    pub configuration: Option<String>,
    pub platform: Option<String>,
    pub test_filter: Option<String>,
    pub device_id: Option<String>,
    pub build_tool: Option<String>,
    pub clean_build: Option<bool>,
    pub deploy_dir: Option<PathBuf>,
    pub nunit_console: Option<PathBuf>,
}

impl StepConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| LoadError::Yaml {
            file: path.display().to_string(),
            error: e,
        })
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(v) = overrides.solution {
            self.solution = v;
        }
        if let Some(v) = overrides.configuration {
            self.configuration = v;
        }
        if let Some(v) = overrides.platform {
            self.platform = v;
        }
        if let Some(v) = overrides.test_filter {
            self.test_filter = v;
        }
        if let Some(v) = overrides.device_id {
            self.device_id = v;
        }
        if let Some(v) = overrides.build_tool {
            self.build_tool = v;
        }
        if let Some(v) = overrides.clean_build {
            self.clean_build = v;
        }
        if let Some(v) = overrides.deploy_dir {
            // BITRISE_DEPLOY_DIR may be exported but empty
            if !v.as_os_str().is_empty() {
                self.deploy_dir = v;
            }
        }
        if let Some(v) = overrides.nunit_console {
            if !v.as_os_str().is_empty() {
                self.nunit_console = Some(v);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.solution.as_os_str().is_empty() {
            return Err(ConfigError::Empty {
                field: "XamarinSolution",
            });
        }
        if !self.solution.exists() {
            return Err(ConfigError::PathNotFound {
                field: "XamarinSolution",
                path: self.solution.display().to_string(),
            });
        }
        require_non_empty("XamarinConfiguration", &self.configuration)?;
        require_non_empty("XamarinPlatform", &self.platform)?;
        require_non_empty("EmulatorSerial", &self.device_id)?;
        self.build_tool()?;
        Ok(())
    }

    pub fn build_tool(&self) -> Result<BuildTool, ConfigError> {
        self.build_tool.parse()
    }

    pub fn result_log_path(&self) -> PathBuf {
        self.deploy_dir.join(RESULT_LOG_FILE_NAME)
    }

    pub fn log_summary(&self) {
        info!("Build Configs:");
        info!("- XamarinSolution: {}", self.solution.display());
        info!("- XamarinConfiguration: {}", self.configuration);
        info!("- XamarinPlatform: {}", self.platform);

        info!("Xamarin UITest Configs:");
        info!("- TestToRun: {}", self.test_filter);
        info!("- EmulatorSerial: {}", self.device_id);

        info!("Other Configs:");
        info!("- BuildTool: {}", self.build_tool);
        info!("- CleanBuild: {}", self.clean_build);
        info!("- DeployDir: {}", self.deploy_dir.display());
        if let Some(console) = &self.nunit_console {
            info!("- NunitConsole: {}", console.display());
        }
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Empty { field })
    } else {
        Ok(())
    }
}
