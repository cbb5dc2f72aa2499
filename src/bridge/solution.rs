//! Solution and project file scanning
//!
//! Reads just enough of `.sln` and `.csproj` files to know which projects are
//! Android applications, which are Xamarin.UITest projects, what they
//! reference and where their build outputs land.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static SLN_PROJECT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Project\("\{[^"]*\}"\)\s*=\s*"([^"]*)",\s*"([^"]*\.csproj)""#).unwrap()
});

static ASSEMBLY_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<AssemblyName>\s*([^<]+?)\s*</AssemblyName>").unwrap());

static ANDROID_APPLICATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<AndroidApplication>\s*true\s*</AndroidApplication>").unwrap()
});

static UITEST_REFERENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"Include="Xamarin\.UITest[",]"#).unwrap());

static PROJECT_REFERENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<ProjectReference\s+Include="([^"]+)""#).unwrap());

static PROPERTY_GROUP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<PropertyGroup[^>]*Condition="([^"]*)"[^>]*>(.*?)</PropertyGroup>"#)
        .unwrap()
});

static OUTPUT_PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<OutputPath>\s*([^<]+?)\s*</OutputPath>").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum SolutionError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Solution has no C# projects: {0}")]
    NoProjects(String),
}

/// A project entry of a solution file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionProject {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub path: PathBuf,
    pub name: String,
    pub projects: Vec<SolutionProject>,
}

impl Solution {
    pub fn open(path: &Path) -> Result<Self, SolutionError> {
        let content = read(path)?;
        let solution = Self::parse(path, &content);
        if solution.projects.is_empty() {
            return Err(SolutionError::NoProjects(path.display().to_string()));
        }
        Ok(solution)
    }

    pub fn parse(path: &Path, content: &str) -> Self {
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let projects = SLN_PROJECT_REGEX
            .captures_iter(content)
            .map(|caps| SolutionProject {
                name: caps[1].trim().to_string(),
                path: dir.join(normalize_separators(caps[2].trim())),
            })
            .collect();

        Self {
            path: path.to_path_buf(),
            name: file_stem(path),
            projects,
        }
    }
}

/// The parts of a `.csproj` the builder cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    pub name: String,
    pub path: PathBuf,
    pub assembly_name: String,
    pub is_android_app: bool,
    pub is_uitest: bool,
    /// Referenced project names (file stems), in declaration order
    pub references: Vec<String>,
    output_paths: Vec<(String, PathBuf)>,
}

impl ProjectFile {
    pub fn load(project: &SolutionProject) -> Result<Self, SolutionError> {
        let content = read(&project.path)?;
        Ok(Self::parse(&project.name, &project.path, &content))
    }

    pub fn parse(name: &str, path: &Path, content: &str) -> Self {
        let assembly_name = ASSEMBLY_NAME_REGEX
            .captures(content)
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| name.to_string());

        let references = PROJECT_REFERENCE_REGEX
            .captures_iter(content)
            .map(|caps| file_stem(Path::new(&normalize_separators(&caps[1]))))
            .collect();

        let output_paths = PROPERTY_GROUP_REGEX
            .captures_iter(content)
            .filter_map(|caps| {
                let output = OUTPUT_PATH_REGEX.captures(&caps[2])?;
                Some((
                    caps[1].to_string(),
                    PathBuf::from(normalize_separators(&output[1])),
                ))
            })
            .collect();

        Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            assembly_name,
            is_android_app: ANDROID_APPLICATION_REGEX.is_match(content),
            is_uitest: UITEST_REFERENCE_REGEX.is_match(content),
            references,
            output_paths,
        }
    }

    /// Directory the project builds into for `configuration`.
    /// Falls back to `bin/<configuration>` when the project does not say.
    pub fn output_dir(&self, configuration: &str) -> PathBuf {
        let needle = format!("'{}|", configuration);
        let relative = self
            .output_paths
            .iter()
            .find(|(condition, _)| condition.contains(&needle))
            .map(|(_, path)| path.clone())
            .unwrap_or_else(|| Path::new("bin").join(configuration));

        self.directory().join(relative)
    }

    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

fn read(path: &Path) -> Result<String, SolutionError> {
    std::fs::read_to_string(path).map_err(|source| SolutionError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn normalize_separators(path: &str) -> String {
    path.trim().replace('\\', "/")
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}
