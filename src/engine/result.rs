//! Run result types

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use super::error::StepError;
use super::pairing::TestPairing;

/// Overall outcome handed back to the CI system
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Succeeded,
    Failed,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Succeeded => "succeeded",
            Verdict::Failed => "failed",
        }
    }
}

/// Result of running one pairing
#[derive(Debug, Clone, Serialize)]
pub struct PairingResult {
    #[serde(flatten)]
    pub pairing: TestPairing,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

/// Result of a whole step run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub verdict: Verdict,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub pairings: Vec<PairingResult>,
    pub warnings: Vec<String>,
    /// Last failure message found in the result log
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    #[serde(rename = "error", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Content of the result log after the last run attempt
    #[serde(skip)]
    pub full_results: String,
    #[serde(skip)]
    pub error: Option<StepError>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            verdict: Verdict::Failed,
            started_at: Utc::now(),
            finished_at: None,
            pairings: Vec::new(),
            warnings: Vec::new(),
            failure_message: None,
            error_message: None,
            full_results: String::new(),
            error: None,
        }
    }

    pub fn success(&self) -> bool {
        self.verdict == Verdict::Succeeded
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
