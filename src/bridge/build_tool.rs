//! Build Tool Bridge - compiles the solution's UI-test projects with msbuild,
//! xbuild or mdtool
//!
//! Every UI-test project is built together with the Android application
//! projects it references. Applications are packaged (`PackageForAndroid`)
//! so an `.apk` lands in their output directory; test projects get a plain
//! `Build`. Each project is one external command, run with inherited stdio.
//! NuGet packages are restored for the solution first, and the selected
//! projects can be cleaned before anything is compiled.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use super::solution::{ProjectFile, Solution};
use super::{
    printable_command_line, BuildError, BuildObserver, BuildWindow, ProjectBuildEvent,
    SolutionBuilder, WithWarnings,
};
use crate::engine::outputs::{
    Artifact, OutputKind, ProjectOutput, ProjectOutputMap, TestProjectOutput,
    TestProjectOutputMap,
};
use crate::step::BuildTool;

/// Filesystem timestamps can be coarser than the clock used for the window
const MTIME_SLACK_SECONDS: i64 = 2;

const NUGET_BINARY: &str = "nuget";
const MONO_NUGET: &str = "/Library/Frameworks/Mono.framework/Versions/Current/bin/nuget";

/// Projects selected for the build
#[derive(Debug, Clone)]
struct BuildTargets {
    solution_name: String,
    apps: Vec<ProjectFile>,
    tests: Vec<ProjectFile>,
}

impl BuildTargets {
    fn referenced_apps<'a>(&'a self, test: &'a ProjectFile) -> impl Iterator<Item = &'a ProjectFile> {
        test.references
            .iter()
            .filter_map(move |name| self.apps.iter().find(|app| &app.name == name))
    }
}

/// [`SolutionBuilder`] backed by one of the Xamarin command line build tools
pub struct ToolBuilder {
    solution: PathBuf,
    tool: BuildTool,
    restore: bool,
    nuget: Option<PathBuf>,
    clean: bool,
    targets: Option<BuildTargets>,
}

impl ToolBuilder {
    pub fn new(solution: impl Into<PathBuf>, tool: BuildTool) -> Self {
        Self {
            solution: solution.into(),
            tool,
            restore: true,
            nuget: None,
            clean: false,
            targets: None,
        }
    }

    /// Run `nuget restore` on the solution before building (default on)
    pub fn with_restore(mut self, restore: bool) -> Self {
        self.restore = restore;
        self
    }

    /// Use this nuget instead of looking one up
    pub fn with_nuget(mut self, nuget: impl Into<PathBuf>) -> Self {
        self.nuget = Some(nuget.into());
        self
    }

    /// Clean every selected project before building (default off)
    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    fn load_targets(&self) -> Result<BuildTargets, BuildError> {
        let solution = Solution::open(&self.solution)?;

        let mut projects = Vec::new();
        for entry in &solution.projects {
            projects.push(ProjectFile::load(entry)?);
        }

        let tests: Vec<ProjectFile> = projects.iter().filter(|p| p.is_uitest).cloned().collect();
        if tests.is_empty() {
            return Err(BuildError::NothingToBuild(format!(
                "no Xamarin.UITest project in {}",
                self.solution.display()
            )));
        }

        let referenced: HashSet<&str> = tests
            .iter()
            .flat_map(|t| t.references.iter().map(String::as_str))
            .collect();
        let apps = projects
            .iter()
            .filter(|p| p.is_android_app && referenced.contains(p.name.as_str()))
            .cloned()
            .collect();

        Ok(BuildTargets {
            solution_name: solution.name,
            apps,
            tests,
        })
    }

    fn targets(&self) -> Result<BuildTargets, BuildError> {
        match &self.targets {
            Some(targets) => Ok(targets.clone()),
            None => self.load_targets(),
        }
    }

    /// Program and arguments building a single project
    fn project_command(
        &self,
        project: &ProjectFile,
        is_test: bool,
        configuration: &str,
        platform: &str,
    ) -> (String, Vec<String>) {
        match self.tool {
            BuildTool::Msbuild | BuildTool::Xbuild => {
                let target = if is_test { "Build" } else { "PackageForAndroid" };
                (
                    self.tool.as_str().to_string(),
                    vec![
                        project.path.display().to_string(),
                        format!("/t:{}", target),
                        format!("/p:Configuration={}", configuration),
                        format!("/p:Platform={}", project_platform(platform)),
                    ],
                )
            }
            BuildTool::Mdtool => (
                self.tool.as_str().to_string(),
                vec![
                    "build".to_string(),
                    format!("-c:{}|{}", configuration, platform),
                    self.solution.display().to_string(),
                    format!("-p:{}", project.name),
                ],
            ),
        }
    }

    fn clean_command(
        &self,
        project: &ProjectFile,
        configuration: &str,
        platform: &str,
    ) -> (String, Vec<String>) {
        match self.tool {
            BuildTool::Msbuild | BuildTool::Xbuild => (
                self.tool.as_str().to_string(),
                vec![
                    project.path.display().to_string(),
                    "/t:Clean".to_string(),
                    format!("/p:Configuration={}", configuration),
                    format!("/p:Platform={}", project_platform(platform)),
                ],
            ),
            BuildTool::Mdtool => (
                self.tool.as_str().to_string(),
                vec![
                    "build".to_string(),
                    "-t:Clean".to_string(),
                    format!("-c:{}|{}", configuration, platform),
                    self.solution.display().to_string(),
                    format!("-p:{}", project.name),
                ],
            ),
        }
    }

    fn locate_nuget(&self) -> Option<PathBuf> {
        if let Some(nuget) = &self.nuget {
            return Some(nuget.clone());
        }
        which::which(NUGET_BINARY)
            .ok()
            .or_else(|| Some(PathBuf::from(MONO_NUGET)).filter(|p| p.is_file()))
    }

    /// Missing nuget is a warning, a failed restore is an error
    async fn restore_packages(&self, warnings: &mut Vec<String>) -> Result<(), BuildError> {
        let Some(nuget) = self.locate_nuget() else {
            warnings.push(format!(
                "{} not found, skipping package restore for: {}",
                NUGET_BINARY,
                self.solution.display()
            ));
            return Ok(());
        };

        let program = nuget.display().to_string();
        let args = vec!["restore".to_string(), self.solution.display().to_string()];
        let printable = printable_command_line(&program, &args);
        info!("Restoring NuGet packages for solution: {}", self.solution.display());
        info!("$ {}", printable);
        Self::run_command(&program, &args, &printable).await
    }

    async fn clean_projects(
        &self,
        targets: &BuildTargets,
        configuration: &str,
        platform: &str,
    ) -> Result<(), BuildError> {
        for project in targets.apps.iter().chain(targets.tests.iter()) {
            let (program, args) = self.clean_command(project, configuration, platform);
            let printable = printable_command_line(&program, &args);
            info!("Cleaning project: {}", project.name);
            info!("$ {}", printable);
            Self::run_command(&program, &args, &printable).await?;
        }
        Ok(())
    }

    async fn run_command(program: &str, args: &[String], printable: &str) -> Result<(), BuildError> {
        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .map_err(|source| BuildError::Spawn {
                command: printable.to_string(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(BuildError::CommandFailed {
                command: printable.to_string(),
                code: status.code().unwrap_or(-1),
            })
        }
    }
}

/// Solution platforms are spelled "Any CPU", project platforms "AnyCPU"
fn project_platform(platform: &str) -> String {
    platform.replace("Any CPU", "AnyCPU")
}

#[async_trait]
impl SolutionBuilder for ToolBuilder {
    async fn build_all(
        &mut self,
        configuration: &str,
        platform: &str,
        observer: &mut dyn BuildObserver,
    ) -> WithWarnings<()> {
        let targets = match self.load_targets() {
            Ok(targets) => targets,
            Err(e) => return WithWarnings::err(e, Vec::new()),
        };

        let mut warnings = Vec::new();

        if self.restore {
            if let Err(e) = self.restore_packages(&mut warnings).await {
                return WithWarnings::err(e, warnings);
            }
        }
        if self.clean {
            if let Err(e) = self.clean_projects(&targets, configuration, platform).await {
                return WithWarnings::err(e, warnings);
            }
        }

        let mut performed = HashSet::new();

        for test in &targets.tests {
            let apps: Vec<&ProjectFile> = targets.referenced_apps(test).collect();
            if apps.is_empty() {
                warnings.push(format!(
                    "Test project ({}) does not refer to any Android application project",
                    test.name
                ));
            }

            let steps = apps
                .into_iter()
                .map(|app| (app, false))
                .chain(std::iter::once((test, true)));

            for (project, is_test) in steps {
                let (program, args) = self.project_command(project, is_test, configuration, platform);
                let printable = printable_command_line(&program, &args);
                let already_performed = !performed.insert(printable.clone());

                observer.on_project(&ProjectBuildEvent {
                    solution: targets.solution_name.clone(),
                    project: project.name.clone(),
                    is_test_project: is_test,
                    command: printable.clone(),
                    already_performed,
                });

                if already_performed {
                    continue;
                }

                if let Err(e) = Self::run_command(&program, &args, &printable).await {
                    return WithWarnings::err(e, warnings);
                }
            }
        }

        self.targets = Some(targets);
        WithWarnings::ok((), warnings)
    }

    fn collect_project_outputs(
        &self,
        configuration: &str,
        _platform: &str,
        window: BuildWindow,
    ) -> Result<ProjectOutputMap, BuildError> {
        let targets = self.targets()?;
        let window = widen(window);
        let mut outputs = ProjectOutputMap::new();

        for app in &targets.apps {
            let output_dir = app.output_dir(configuration);
            let mut apks = files_built_in(&output_dir, "apk", window)?;
            // signed package first, that is the installable one
            apks.sort_by_key(|p| (!is_signed_apk(p), p.clone()));

            let mut artifacts: Vec<Artifact> = apks
                .into_iter()
                .map(|p| Artifact::new(OutputKind::Apk, p))
                .collect();

            let dll = output_dir.join(format!("{}.dll", app.assembly_name));
            if built_in(&dll, window)? {
                artifacts.push(Artifact::new(OutputKind::Dll, dll));
            }

            debug!(project = %app.name, artifacts = artifacts.len(), "collected project outputs");
            outputs.insert(app.name.clone(), ProjectOutput::new(artifacts));
        }

        Ok(outputs)
    }

    fn collect_test_project_outputs(
        &self,
        configuration: &str,
        _platform: &str,
        window: BuildWindow,
    ) -> WithWarnings<TestProjectOutputMap> {
        let targets = match self.targets() {
            Ok(targets) => targets,
            Err(e) => return WithWarnings::err(e, Vec::new()),
        };
        let window = widen(window);
        let mut warnings = Vec::new();
        let mut outputs = TestProjectOutputMap::new();

        for test in &targets.tests {
            let dll = test
                .output_dir(configuration)
                .join(format!("{}.dll", test.assembly_name));

            match built_in(&dll, window) {
                Ok(true) => {
                    outputs.insert(
                        test.name.clone(),
                        TestProjectOutput {
                            assembly: Artifact::new(OutputKind::Dll, dll),
                            referenced_projects: test.references.clone(),
                        },
                    );
                }
                Ok(false) => warnings.push(format!(
                    "No test assembly built for project ({}) at: {}",
                    test.name,
                    dll.display()
                )),
                Err(e) => return WithWarnings::err(e, warnings),
            }
        }

        WithWarnings::ok(outputs, warnings)
    }
}

fn widen(window: BuildWindow) -> BuildWindow {
    let slack = Duration::seconds(MTIME_SLACK_SECONDS);
    BuildWindow::new(window.start - slack, window.end + slack)
}

fn is_signed_apk(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.ends_with("-Signed"))
        .unwrap_or(false)
}

/// Whether `path` exists and was last written inside the window
fn built_in(path: &Path, window: BuildWindow) -> Result<bool, BuildError> {
    if !path.is_file() {
        return Ok(false);
    }
    let modified: DateTime<Utc> = std::fs::metadata(path)?.modified()?.into();
    Ok(window.contains(modified))
}

/// Files below `dir` with the given extension written inside the window
fn files_built_in(dir: &Path, extension: &str, window: BuildWindow) -> Result<Vec<PathBuf>, BuildError> {
    let mut found = Vec::new();
    if !dir.is_dir() {
        return Ok(found);
    }

    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some(extension)
                && built_in(&path, window)?
            {
                found.push(path);
            }
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    struct Recorder(Vec<ProjectBuildEvent>);

    impl BuildObserver for Recorder {
        fn on_project(&mut self, event: &ProjectBuildEvent) {
            self.0.push(event.clone());
        }
    }

    fn write_solution(root: &Path) -> PathBuf {
        let sln = root.join("App.sln");
        fs::write(
            &sln,
            r#"
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "App.Droid", "App.Droid\App.Droid.csproj", "{1}"
EndProject
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "App.UITests", "App.UITests\App.UITests.csproj", "{2}"
EndProject
"#,
        )
        .unwrap();

        fs::create_dir_all(root.join("App.Droid")).unwrap();
        fs::write(
            root.join("App.Droid/App.Droid.csproj"),
            "<Project><PropertyGroup><AndroidApplication>true</AndroidApplication></PropertyGroup></Project>",
        )
        .unwrap();

        fs::create_dir_all(root.join("App.UITests")).unwrap();
        fs::write(
            root.join("App.UITests/App.UITests.csproj"),
            r#"<Project><ItemGroup><Reference Include="Xamarin.UITest, Version=2.2.0.0" /><ProjectReference Include="..\App.Droid\App.Droid.csproj" /></ItemGroup></Project>"#,
        )
        .unwrap();

        sln
    }

    fn window_around_now() -> BuildWindow {
        let now = Utc::now();
        BuildWindow::new(now - Duration::seconds(60), now + Duration::seconds(60))
    }

    #[test]
    fn test_msbuild_commands() {
        let builder = ToolBuilder::new("/src/App.sln", BuildTool::Msbuild);
        let project = ProjectFile::parse("App.Droid", Path::new("/src/App.Droid/App.Droid.csproj"), "");

        let (program, args) = builder.project_command(&project, false, "Release", "Any CPU");
        assert_eq!(program, "msbuild");
        assert_eq!(
            args,
            vec![
                "/src/App.Droid/App.Droid.csproj",
                "/t:PackageForAndroid",
                "/p:Configuration=Release",
                "/p:Platform=AnyCPU",
            ]
        );

        let (_, args) = builder.project_command(&project, true, "Release", "Any CPU");
        assert_eq!(args[1], "/t:Build");
    }

    #[test]
    fn test_mdtool_command() {
        let builder = ToolBuilder::new("/src/App.sln", BuildTool::Mdtool);
        let project = ProjectFile::parse("App.Droid", Path::new("/src/App.Droid/App.Droid.csproj"), "");

        let (program, args) = builder.project_command(&project, false, "Debug", "Any CPU");
        assert_eq!(program, "mdtool");
        assert_eq!(args, vec!["build", "-c:Debug|Any CPU", "/src/App.sln", "-p:App.Droid"]);
    }

    #[test]
    fn test_clean_commands() {
        let project = ProjectFile::parse("App.Droid", Path::new("/src/App.Droid/App.Droid.csproj"), "");

        let (program, args) = ToolBuilder::new("/src/App.sln", BuildTool::Msbuild)
            .clean_command(&project, "Release", "Any CPU");
        assert_eq!(program, "msbuild");
        assert_eq!(
            args,
            vec![
                "/src/App.Droid/App.Droid.csproj",
                "/t:Clean",
                "/p:Configuration=Release",
                "/p:Platform=AnyCPU",
            ]
        );

        let (_, args) = ToolBuilder::new("/src/App.sln", BuildTool::Mdtool)
            .clean_command(&project, "Debug", "Any CPU");
        assert_eq!(
            args,
            vec!["build", "-t:Clean", "-c:Debug|Any CPU", "/src/App.sln", "-p:App.Droid"]
        );
    }

    #[test]
    fn test_configured_nuget_wins() {
        let builder = ToolBuilder::new("/src/App.sln", BuildTool::Msbuild).with_nuget("/opt/nuget");
        assert_eq!(builder.locate_nuget(), Some(PathBuf::from("/opt/nuget")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_restore_stops_build() {
        let dir = tempdir().unwrap();
        let sln = write_solution(dir.path());
        let mut builder = ToolBuilder::new(sln, BuildTool::Xbuild).with_nuget("/bin/false");
        let mut recorder = Recorder(Vec::new());

        let outcome = builder
            .build_all("Release", "Any CPU", &mut recorder)
            .await;

        assert!(matches!(outcome.result, Err(BuildError::CommandFailed { .. })));
        assert!(recorder.0.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_restore_runs_before_projects() {
        let dir = tempdir().unwrap();
        let sln = write_solution(dir.path());
        let mut builder = ToolBuilder::new(sln, BuildTool::Xbuild).with_nuget("/bin/true");
        let mut recorder = Recorder(Vec::new());

        // restore succeeds, then the fixture app fails to package
        let outcome = builder
            .build_all("Release", "Any CPU", &mut recorder)
            .await;

        assert!(outcome.result.is_err());
        assert_eq!(recorder.0.len(), 1);
        assert_eq!(recorder.0[0].project, "App.Droid");
    }

    #[test]
    fn test_targets_select_uitest_and_referenced_apps() {
        let dir = tempdir().unwrap();
        let sln = write_solution(dir.path());

        let targets = ToolBuilder::new(sln, BuildTool::Xbuild).load_targets().unwrap();
        assert_eq!(targets.solution_name, "App");
        assert_eq!(targets.tests.len(), 1);
        assert_eq!(targets.apps.len(), 1);
        assert_eq!(targets.apps[0].name, "App.Droid");
    }

    #[test]
    fn test_solution_without_uitest_project() {
        let dir = tempdir().unwrap();
        let sln = dir.path().join("Lib.sln");
        fs::write(
            &sln,
            r#"Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "Lib", "Lib\Lib.csproj", "{1}""#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("Lib")).unwrap();
        fs::write(dir.path().join("Lib/Lib.csproj"), "<Project />").unwrap();

        let err = ToolBuilder::new(sln, BuildTool::Msbuild).load_targets().unwrap_err();
        assert!(matches!(err, BuildError::NothingToBuild(_)));
    }

    #[tokio::test]
    async fn test_build_stops_at_first_failing_project() {
        let dir = tempdir().unwrap();
        let sln = write_solution(dir.path());
        let mut builder = ToolBuilder::new(sln, BuildTool::Xbuild).with_restore(false);
        let mut recorder = Recorder(Vec::new());

        // the fixture projects are not buildable, so packaging the app fails
        // (or xbuild is missing) before the test project is attempted
        let outcome = builder
            .build_all("Release", "Any CPU", &mut recorder)
            .await;

        assert!(outcome.result.is_err());
        assert_eq!(recorder.0.len(), 1);
        assert_eq!(recorder.0[0].project, "App.Droid");
        assert!(!recorder.0[0].is_test_project);
        assert!(!recorder.0[0].already_performed);
    }

    #[test]
    fn test_collect_outputs() {
        let dir = tempdir().unwrap();
        let sln = write_solution(dir.path());

        let droid_out = dir.path().join("App.Droid/bin/Release");
        fs::create_dir_all(&droid_out).unwrap();
        fs::write(droid_out.join("com.app.apk"), "").unwrap();
        fs::write(droid_out.join("com.app-Signed.apk"), "").unwrap();

        let builder = ToolBuilder::new(sln, BuildTool::Msbuild);
        let outputs = builder
            .collect_project_outputs("Release", "Any CPU", window_around_now())
            .unwrap();

        let droid = outputs.get("App.Droid").unwrap();
        assert_eq!(
            droid.locate(OutputKind::Apk),
            Some(droid_out.join("com.app-Signed.apk").as_path())
        );

        // the test assembly was never built
        let tests = builder.collect_test_project_outputs("Release", "Any CPU", window_around_now());
        assert!(tests.result.unwrap().is_empty());
        assert_eq!(tests.warnings.len(), 1);

        let test_out = dir.path().join("App.UITests/bin/Release");
        fs::create_dir_all(&test_out).unwrap();
        fs::write(test_out.join("App.UITests.dll"), "").unwrap();

        let tests = builder.collect_test_project_outputs("Release", "Any CPU", window_around_now());
        let tests = tests.result.unwrap();
        let uitests = tests.get("App.UITests").unwrap();
        assert_eq!(uitests.assembly.path, test_out.join("App.UITests.dll"));
        assert_eq!(uitests.referenced_projects, vec!["App.Droid"]);
    }

    #[test]
    fn test_stale_outputs_are_ignored() {
        let dir = tempdir().unwrap();
        let sln = write_solution(dir.path());

        let droid_out = dir.path().join("App.Droid/bin/Release");
        fs::create_dir_all(&droid_out).unwrap();
        fs::write(droid_out.join("com.app-Signed.apk"), "").unwrap();

        let future = Utc::now() + Duration::hours(1);
        let window = BuildWindow::new(future, future + Duration::seconds(5));
        let outputs = ToolBuilder::new(sln, BuildTool::Msbuild)
            .collect_project_outputs("Release", "Any CPU", window)
            .unwrap();

        assert!(outputs.get("App.Droid").unwrap().artifacts.is_empty());
    }
}
