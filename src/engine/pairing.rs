//! Test pairing resolver
//!
//! Maps every UI-test project to the application packages it should be run
//! against. Each referenced project resolves to exactly one of three outcomes
//! (see [`ReferenceLookup`]); only a project that exists but has no APK stops
//! the run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::outputs::{OutputKind, ProjectOutputMap, TestProjectOutputMap};

/// One (test project, application project) combination to execute
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestPairing {
    pub test_project: String,
    pub referenced_project: String,
    pub assembly_path: PathBuf,
    pub package_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairingError {
    #[error("No apk generated for project: {project} (referenced by {test_project})")]
    MissingPackage {
        test_project: String,
        project: String,
    },
}

/// Outcome of looking up a single referenced project
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceLookup {
    /// Not among the collected project outputs (e.g. a class library)
    Skipped,
    /// Application package to test against
    Resolved(PathBuf),
    /// Built, but without an application package
    Fatal(PairingError),
}

/// Ordered pairings plus the warnings raised while resolving them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairingPlan {
    pub pairings: Vec<TestPairing>,
    pub warnings: Vec<String>,
}

pub fn lookup_reference(
    test_project: &str,
    project: &str,
    outputs: &ProjectOutputMap,
) -> ReferenceLookup {
    let Some(output) = outputs.get(project) else {
        return ReferenceLookup::Skipped;
    };

    match output.locate(OutputKind::Apk) {
        Some(path) => ReferenceLookup::Resolved(path.to_path_buf()),
        None => ReferenceLookup::Fatal(PairingError::MissingPackage {
            test_project: test_project.to_string(),
            project: project.to_string(),
        }),
    }
}

/// Resolve the pairings to execute, in test-project then reference order.
pub fn resolve_pairings(
    test_outputs: &TestProjectOutputMap,
    project_outputs: &ProjectOutputMap,
) -> Result<PairingPlan, PairingError> {
    let mut plan = PairingPlan::default();

    for (test_project, test_output) in test_outputs {
        if test_output.referenced_projects.is_empty() {
            let message = format!(
                "Test project ({}) does not refer to any project, skipping...",
                test_project
            );
            warn!("{}", message);
            plan.warnings.push(message);
            continue;
        }

        for project in &test_output.referenced_projects {
            match lookup_reference(test_project, project, project_outputs) {
                ReferenceLookup::Skipped => {
                    debug!(test_project = %test_project, project = %project, "reference has no collected output");
                }
                ReferenceLookup::Resolved(package_path) => plan.pairings.push(TestPairing {
                    test_project: test_project.clone(),
                    referenced_project: project.clone(),
                    assembly_path: test_output.assembly.path.clone(),
                    package_path,
                }),
                ReferenceLookup::Fatal(err) => return Err(err),
            }
        }
    }

    Ok(plan)
}
