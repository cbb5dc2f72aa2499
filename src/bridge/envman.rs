//! Step output exporters
//!
//! `envman` is the CI host's environment store; outputs written with it are
//! visible to every later step. When it is not installed (local runs) the
//! outputs are only logged.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

use super::{EnvExporter, ExportError};

/// Exports through `envman add --key <KEY>`, the value is written to stdin
pub struct EnvmanExporter {
    envman: PathBuf,
}

impl EnvmanExporter {
    pub fn new(envman: impl Into<PathBuf>) -> Self {
        Self {
            envman: envman.into(),
        }
    }

    /// `envman` from `PATH`, if installed
    pub fn from_path() -> Option<Self> {
        which::which("envman").ok().map(Self::new)
    }
}

#[async_trait]
impl EnvExporter for EnvmanExporter {
    async fn export(&mut self, key: &str, value: &str) -> Result<(), ExportError> {
        let mut child = Command::new(&self.envman)
            .args(["add", "--key", key])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(value.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(ExportError::Failed(status.code().unwrap_or(-1)))
        }
    }
}

/// Logs outputs instead of exporting them
#[derive(Debug, Default)]
pub struct LogExporter;

#[async_trait]
impl EnvExporter for LogExporter {
    async fn export(&mut self, key: &str, value: &str) -> Result<(), ExportError> {
        info!(key = %key, bytes = value.len(), "envman not available, output not exported");
        Ok(())
    }
}

/// Keeps every export in memory. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingExporter {
    exports: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All exports in the order they happened
    pub fn exports(&self) -> Vec<(String, String)> {
        self.exports
            .lock()
            .map(|exports| exports.clone())
            .unwrap_or_default()
    }

    /// Every value exported for `key`, oldest first
    pub fn values(&self, key: &str) -> Vec<String> {
        self.exports()
            .into_iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect()
    }

    /// Most recent value exported for `key`
    pub fn last(&self, key: &str) -> Option<String> {
        self.values(key).pop()
    }
}

#[async_trait]
impl EnvExporter for RecordingExporter {
    async fn export(&mut self, key: &str, value: &str) -> Result<(), ExportError> {
        if let Ok(mut exports) = self.exports.lock() {
            exports.push((key.to_string(), value.to_string()));
        }
        Ok(())
    }
}
