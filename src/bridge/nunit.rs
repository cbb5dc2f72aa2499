//! NUnit Bridge - runs Xamarin.UITest assemblies through `nunit3-console`
//!
//! The console is looked up once, then invoked per test assembly. The APK
//! path and the emulator serial reach the UITest code through the console's
//! own environment, never through the step's process environment.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use super::{printable_command_line, ConsoleError, TestConsole, TestInvocation};

const CONSOLE_BINARY: &str = "nunit3-console";

/// Read by Xamarin.UITest's `ConfigureApp.Android.DeviceSerial` helpers
pub const EMULATOR_SERIAL_ENV: &str = "ANDROID_EMULATOR_SERIAL";

const WELL_KNOWN_LOCATIONS: &[&str] = &[
    "/Library/Frameworks/Mono.framework/Versions/Current/Commands/nunit3-console",
    "/Library/Frameworks/Mono.framework/Versions/Current/lib/mono/nunit3-console/nunit3-console.exe",
    "/usr/local/bin/nunit3-console",
    "/usr/lib/nunit3/nunit3-console.exe",
];

#[derive(Debug, Default)]
pub struct NunitConsole {
    configured: Option<PathBuf>,
    console: Option<PathBuf>,
}

impl NunitConsole {
    pub fn new(configured: Option<PathBuf>) -> Self {
        Self {
            configured,
            console: None,
        }
    }

    /// Console already known, no lookup needed
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            configured: None,
            console: Some(path.into()),
        }
    }

    fn command_parts(&self, invocation: &TestInvocation) -> (String, Vec<String>) {
        let console = self
            .console
            .as_deref()
            .unwrap_or_else(|| Path::new(CONSOLE_BINARY));

        let mut args = vec![
            invocation.assembly.display().to_string(),
            format!("--result={}", invocation.result_log.display()),
        ];
        if !invocation.filter.is_empty() {
            args.push(format!("--test={}", invocation.filter));
        }

        // .exe consoles are managed assemblies and need mono
        if console.extension().and_then(|e| e.to_str()) == Some("exe") {
            args.insert(0, console.display().to_string());
            ("mono".to_string(), args)
        } else {
            (console.display().to_string(), args)
        }
    }
}

fn discover() -> Option<PathBuf> {
    if let Ok(path) = which::which(CONSOLE_BINARY) {
        return Some(path);
    }
    WELL_KNOWN_LOCATIONS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

#[async_trait]
impl TestConsole for NunitConsole {
    fn locate(&mut self) -> Result<PathBuf, ConsoleError> {
        if let Some(console) = &self.console {
            return Ok(console.clone());
        }

        let console = match &self.configured {
            Some(path) if path.is_file() => path.clone(),
            Some(path) => {
                return Err(ConsoleError::NotInstalled(format!(
                    "configured console does not exist: {}",
                    path.display()
                )))
            }
            None => discover().ok_or_else(|| {
                ConsoleError::NotInstalled(format!("{} not found", CONSOLE_BINARY))
            })?,
        };

        debug!(console = %console.display(), "located nunit console");
        self.console = Some(console.clone());
        Ok(console)
    }

    fn printable_command(&self, invocation: &TestInvocation) -> String {
        let (program, args) = self.command_parts(invocation);
        printable_command_line(&program, &args)
    }

    async fn run(&self, invocation: &TestInvocation) -> Result<(), ConsoleError> {
        if self.console.is_none() {
            return Err(ConsoleError::NotLocated);
        }

        let (program, args) = self.command_parts(invocation);
        let status = Command::new(&program)
            .args(&args)
            .envs(&invocation.env)
            .env(EMULATOR_SERIAL_ENV, &invocation.device_id)
            .status()
            .await
            .map_err(|source| ConsoleError::Spawn {
                command: printable_command_line(&program, &args),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ConsoleError::TestsFailed(status.code().unwrap_or(-1)))
        }
    }
}
