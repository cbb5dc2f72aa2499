//! Build output types and the output locator

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Kind of file a project build produced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Installable Android application package
    Apk,
    /// Managed assembly (test assemblies are of this kind)
    Dll,
}

/// A single file produced by a build
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    pub kind: OutputKind,
    pub path: PathBuf,
}

impl Artifact {
    pub fn new(kind: OutputKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Outputs of one application project
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectOutput {
    pub artifacts: Vec<Artifact>,
}

impl ProjectOutput {
    pub fn new(artifacts: Vec<Artifact>) -> Self {
        Self { artifacts }
    }

    /// Path of the first artifact of the given kind
    pub fn locate(&self, kind: OutputKind) -> Option<&Path> {
        locate_output(&self.artifacts, kind)
    }
}

/// Output of one UI-test project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestProjectOutput {
    /// The compiled test assembly
    pub assembly: Artifact,
    /// Names of the projects the test project references, in declaration order
    pub referenced_projects: Vec<String>,
}

/// project name -> outputs. Ordered so that every walk over it is reproducible.
pub type ProjectOutputMap = BTreeMap<String, ProjectOutput>;

/// test project name -> test output
pub type TestProjectOutputMap = BTreeMap<String, TestProjectOutput>;

/// Returns the path of the first artifact matching `kind`, `None` if there is none.
pub fn locate_output(artifacts: &[Artifact], kind: OutputKind) -> Option<&Path> {
    artifacts
        .iter()
        .find(|artifact| artifact.kind == kind)
        .map(|artifact| artifact.path.as_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_first_match() {
        let output = ProjectOutput::new(vec![
            Artifact::new(OutputKind::Dll, "/out/App.dll"),
            Artifact::new(OutputKind::Apk, "/out/com.app-Signed.apk"),
            Artifact::new(OutputKind::Apk, "/out/com.app.apk"),
        ]);

        assert_eq!(
            output.locate(OutputKind::Apk),
            Some(Path::new("/out/com.app-Signed.apk"))
        );
        assert_eq!(output.locate(OutputKind::Dll), Some(Path::new("/out/App.dll")));
    }

    #[test]
    fn test_locate_missing_kind() {
        let output = ProjectOutput::new(vec![Artifact::new(OutputKind::Dll, "/out/Lib.dll")]);
        assert_eq!(output.locate(OutputKind::Apk), None);
    }

    #[test]
    fn test_locate_empty() {
        assert_eq!(locate_output(&[], OutputKind::Apk), None);
    }
}
