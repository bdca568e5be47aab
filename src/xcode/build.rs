//! `xcodebuild` invocation.
//!
//! A [`BuildRequest`] is resolved from tool arguments layered over the saved
//! selection and the configured defaults, then rendered into a quoted
//! `xcodebuild` script.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::BuildConfig;
use crate::error::{ToolError, ToolResult};
use crate::xcode::destination::{Destination, DestinationKind};
use crate::xcode::project::ProjectEntry;
use crate::xcode::shell::{tail, CommandOutput, CommandRunner, Script};
use crate::xcode::state::SelectionState;

/// Compiler diagnostics quoted in a report.
const MAX_REPORTED_ERRORS: usize = 20;

/// What `xcodebuild` should do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildAction {
    /// Compile and link.
    #[default]
    Build,
    /// Remove build products.
    Clean,
    /// Build and run tests.
    Test,
}

impl BuildAction {
    /// Returns the `xcodebuild` action word.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Clean => "clean",
            Self::Test => "test",
        }
    }
}

/// Per-call overrides supplied as tool arguments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildOptions {
    /// Project path; defaults to the selected one.
    #[serde(default)]
    pub project: Option<PathBuf>,
    /// Scheme; defaults to the selected one.
    #[serde(default)]
    pub scheme: Option<String>,
    /// Configuration; defaults to the selected one, then the configured default.
    #[serde(default)]
    pub configuration: Option<String>,
    /// Destination; defaults to the selected one.
    #[serde(default)]
    pub destination: Option<Destination>,
    /// Action to perform.
    #[serde(default)]
    pub action: BuildAction,
    /// Timeout override in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// A fully resolved build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Container to build.
    pub project: ProjectEntry,
    /// Scheme to build.
    pub scheme: String,
    /// Build configuration.
    pub configuration: String,
    /// Destination, if any. Without one `xcodebuild` picks its default.
    pub destination: Option<Destination>,
    /// Optional derived data location.
    pub derived_data_path: Option<PathBuf>,
    /// Action to perform.
    pub action: BuildAction,
    /// Wall-clock limit.
    pub timeout: Duration,
}

impl BuildRequest {
    /// Resolves a request from `options`, then `state`, then `config`.
    ///
    /// # Errors
    ///
    /// Returns `NotSelected` if no project or scheme is available, or an
    /// error if the project path is unusable or the destination invalid.
    pub fn resolve(
        options: BuildOptions,
        state: &SelectionState,
        config: &BuildConfig,
    ) -> ToolResult<Self> {
        let project_path = options.project.or_else(|| state.project.clone()).ok_or_else(|| {
            ToolError::NotSelected(
                "no project selected; call list_projects and set_state, or pass `project`"
                    .to_string(),
            )
        })?;
        let project = ProjectEntry::from_path(&project_path)?;

        let scheme = options.scheme.or_else(|| state.scheme.clone()).ok_or_else(|| {
            ToolError::NotSelected(
                "no scheme selected; call list_schemes and set_state, or pass `scheme`"
                    .to_string(),
            )
        })?;

        let configuration = options
            .configuration
            .or_else(|| state.configuration.clone())
            .unwrap_or_else(|| config.default_configuration.clone());

        let destination = options.destination.or_else(|| state.destination.clone());
        if let Some(destination) = &destination {
            destination.validate()?;
        }

        let timeout = Duration::from_secs(options.timeout_secs.unwrap_or(config.timeout_secs));

        Ok(Self {
            project,
            scheme,
            configuration,
            destination,
            derived_data_path: config.derived_data_path.clone(),
            action: options.action,
            timeout,
        })
    }

    /// Arguments shared by the build and settings scripts.
    fn base_script(&self) -> Script {
        let mut script = Script::new("xcodebuild");
        script = match self.project.kind.xcodebuild_flag() {
            Some(flag) => script.arg(flag).path_arg(&self.project.path),
            None => script.current_dir(self.project.working_dir()),
        };
        script = script
            .arg("-scheme")
            .arg(&self.scheme)
            .arg("-configuration")
            .arg(&self.configuration)
            .opt("-destination", self.destination.as_ref().map(Destination::specifier));
        if let Some(path) = &self.derived_data_path {
            script = script.arg("-derivedDataPath").path_arg(path);
        }
        script
    }

    /// Renders the `xcodebuild` script for this request.
    #[must_use]
    pub fn script(&self) -> Script {
        let mut script = self.base_script();
        if self
            .destination
            .as_ref()
            .is_some_and(|d| d.kind == DestinationKind::Device)
        {
            script = script.arg("-allowProvisioningUpdates");
        }
        script.arg(self.action.as_str())
    }

    /// Renders the script printing resolved build settings as JSON.
    #[must_use]
    pub fn settings_script(&self) -> Script {
        self.base_script().arg("-showBuildSettings").arg("-json")
    }
}

/// Outcome of one `xcodebuild` run.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Whether `xcodebuild` exited with status zero.
    pub succeeded: bool,
    /// Action performed.
    pub action: BuildAction,
    /// Container built.
    pub project: PathBuf,
    /// Scheme built.
    pub scheme: String,
    /// Configuration built.
    pub configuration: String,
    /// Destination name, if one was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Exit status, `None` if killed by a signal.
    pub exit_code: Option<i32>,
    /// Wall-clock duration in seconds.
    pub duration_secs: f64,
    /// Compiler errors found in the output.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Tail of the build log.
    pub output: String,
}

impl BuildReport {
    fn new(request: &BuildRequest, output: &CommandOutput, tail_bytes: usize) -> Self {
        let mut log = tail(&output.stdout, tail_bytes);
        if output.stdout_truncated && !log.starts_with("[...") {
            log.insert_str(0, "[... earlier output truncated ...]\n");
        }
        if !output.stderr.trim().is_empty() {
            log.push_str("\n--- stderr ---\n");
            log.push_str(&tail(output.stderr.trim(), tail_bytes / 4));
        }

        Self {
            succeeded: output.success(),
            action: request.action,
            project: request.project.path.clone(),
            scheme: request.scheme.clone(),
            configuration: request.configuration.clone(),
            destination: request.destination.as_ref().map(|d| d.name.clone()),
            exit_code: output.status,
            duration_secs: output.elapsed.as_secs_f64(),
            errors: diagnostics(&output.stdout),
            output: log,
        }
    }
}

/// Collects distinct `error:` diagnostics in output order.
fn diagnostics(log: &str) -> Vec<String> {
    let mut errors: Vec<String> = Vec::new();
    for line in log.lines().map(str::trim) {
        if !(line.contains(": error:") || line.starts_with("error:")) {
            continue;
        }
        if !errors.iter().any(|e| e == line) {
            errors.push(line.to_string());
        }
        if errors.len() == MAX_REPORTED_ERRORS {
            break;
        }
    }
    errors
}

/// Runs `request` and reports the outcome.
///
/// A failed build is a report with `succeeded == false`, not an error.
///
/// # Errors
///
/// Returns an error if `xcodebuild` cannot be started or times out.
pub async fn run_build(
    runner: &CommandRunner,
    request: &BuildRequest,
    tail_bytes: usize,
) -> ToolResult<BuildReport> {
    let script = request.script();
    info!(
        action = request.action.as_str(),
        scheme = %request.scheme,
        configuration = %request.configuration,
        "Starting xcodebuild"
    );

    let output = runner.run_with_timeout(&script, request.timeout).await?;
    let report = BuildReport::new(request, &output, tail_bytes);

    info!(
        succeeded = report.succeeded,
        exit_code = ?report.exit_code,
        errors = report.errors.len(),
        "xcodebuild finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xcode::project::ProjectKind;
    use std::fs;

    fn workspace(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("My App.xcworkspace");
        fs::create_dir_all(&path).unwrap();
        path
    }

    fn simulator() -> Destination {
        Destination {
            kind: DestinationKind::Simulator,
            id: "SIM-1".to_string(),
            name: "iPhone 15".to_string(),
            os: None,
            state: None,
        }
    }

    #[test]
    fn resolves_from_state_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = SelectionState {
            project: Some(workspace(dir.path())),
            scheme: Some("App".to_string()),
            destination: Some(simulator()),
            ..SelectionState::default()
        };

        let request =
            BuildRequest::resolve(BuildOptions::default(), &state, &BuildConfig::default()).unwrap();
        assert_eq!(request.project.kind, ProjectKind::Workspace);
        assert_eq!(request.scheme, "App");
        assert_eq!(request.configuration, "Debug");
        assert_eq!(request.timeout, Duration::from_secs(900));
    }

    #[test]
    fn options_override_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = SelectionState {
            project: Some(workspace(dir.path())),
            scheme: Some("App".to_string()),
            configuration: Some("Debug".to_string()),
            ..SelectionState::default()
        };
        let options = BuildOptions {
            scheme: Some("Widget".to_string()),
            configuration: Some("Release".to_string()),
            action: BuildAction::Test,
            timeout_secs: Some(60),
            ..BuildOptions::default()
        };

        let request = BuildRequest::resolve(options, &state, &BuildConfig::default()).unwrap();
        assert_eq!(request.scheme, "Widget");
        assert_eq!(request.configuration, "Release");
        assert_eq!(request.action, BuildAction::Test);
        assert_eq!(request.timeout, Duration::from_secs(60));
    }

    #[test]
    fn missing_selection_is_reported() {
        let config = BuildConfig::default();
        let err = BuildRequest::resolve(BuildOptions::default(), &SelectionState::default(), &config)
            .unwrap_err();
        assert!(matches!(err, ToolError::NotSelected(_)));
        assert!(err.to_string().contains("no project selected"));

        let dir = tempfile::tempdir().unwrap();
        let state = SelectionState {
            project: Some(workspace(dir.path())),
            ..SelectionState::default()
        };
        let err = BuildRequest::resolve(BuildOptions::default(), &state, &config).unwrap_err();
        assert!(err.to_string().contains("no scheme selected"));
    }

    #[test]
    fn renders_quoted_script() {
        let request = BuildRequest {
            project: ProjectEntry {
                name: "My App".to_string(),
                path: PathBuf::from("/src/My App.xcworkspace"),
                kind: ProjectKind::Workspace,
            },
            scheme: "My App".to_string(),
            configuration: "Debug".to_string(),
            destination: Some(simulator()),
            derived_data_path: Some(PathBuf::from("/tmp/dd")),
            action: BuildAction::Build,
            timeout: Duration::from_secs(1),
        };

        assert_eq!(
            request.script().render(),
            "xcodebuild -workspace '/src/My App.xcworkspace' -scheme 'My App' \
             -configuration Debug -destination id=SIM-1 -derivedDataPath /tmp/dd build"
        );
        assert!(request
            .settings_script()
            .render()
            .ends_with("-showBuildSettings -json"));
    }

    #[test]
    fn device_builds_allow_provisioning_updates() {
        let request = BuildRequest {
            project: ProjectEntry {
                name: "Kit".to_string(),
                path: PathBuf::from("/src/Kit/Package.swift"),
                kind: ProjectKind::SwiftPackage,
            },
            scheme: "Kit".to_string(),
            configuration: "Release".to_string(),
            destination: Some(Destination {
                kind: DestinationKind::Device,
                id: "0000-1".to_string(),
                name: "Phone".to_string(),
                os: None,
                state: None,
            }),
            derived_data_path: None,
            action: BuildAction::Test,
            timeout: Duration::from_secs(1),
        };

        let script = request.script();
        assert_eq!(
            script.render(),
            "xcodebuild -scheme Kit -configuration Release -destination id=0000-1 \
             -allowProvisioningUpdates test"
        );
        assert!(script.to_string().starts_with("(cd /src/Kit && "));
    }

    #[test]
    fn collects_distinct_diagnostics() {
        let log = "\
CompileSwift normal arm64 /src/App/View.swift
/src/App/View.swift:12:5: error: cannot find 'foo' in scope
/src/App/View.swift:12:5: error: cannot find 'foo' in scope
/src/App/Model.swift:3:1: warning: unused variable
error: Signing for \"App\" requires a development team.
** BUILD FAILED **";
        let errors = diagnostics(log);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("cannot find 'foo'"));
        assert!(errors[1].starts_with("error: Signing"));
    }

    #[tokio::test]
    async fn report_for_failed_command() {
        let request = BuildRequest {
            project: ProjectEntry {
                name: "App".to_string(),
                path: PathBuf::from("/src/App.xcodeproj"),
                kind: ProjectKind::Project,
            },
            scheme: "App".to_string(),
            configuration: "Debug".to_string(),
            destination: None,
            derived_data_path: None,
            action: BuildAction::Build,
            timeout: Duration::from_secs(5),
        };
        let runner = CommandRunner::new(Duration::from_secs(5), 4096);
        let script = Script::new("sh")
            .arg("-c")
            .arg("echo 'a.swift:1:1: error: boom'; echo 'warning' >&2; exit 65");
        let output = runner.run(&script).await.unwrap();

        let report = BuildReport::new(&request, &output, 1024);
        assert!(!report.succeeded);
        assert_eq!(report.exit_code, Some(65));
        assert_eq!(report.errors, ["a.swift:1:1: error: boom"]);
        assert!(report.output.contains("--- stderr ---\nwarning"));
    }
}
