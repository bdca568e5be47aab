//! Build-then-launch on a simulator, device or the host Mac.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ToolError, ToolResult};
use crate::xcode::build::{run_build, BuildAction, BuildReport, BuildRequest};
use crate::xcode::destination::{Destination, DestinationKind};
use crate::xcode::shell::{tail, CommandRunner, Script, DEFAULT_COMMAND_TIMEOUT};

/// Bytes of launcher output quoted in a report.
const LAUNCH_OUTPUT_BYTES: usize = 4096;

/// A built application bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppBundle {
    /// Path of the `.app` bundle.
    pub path: PathBuf,
    /// `PRODUCT_BUNDLE_IDENTIFIER`.
    pub bundle_id: String,
    /// Target that produced it.
    pub target: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsEntry {
    #[serde(default)]
    target: String,
    build_settings: serde_json::Map<String, Value>,
}

/// Parses `xcodebuild -showBuildSettings -json` and picks the first target
/// producing an application.
///
/// # Errors
///
/// Returns `UnexpectedOutput` if the output is not the expected JSON or no
/// target builds an `.app` with a bundle identifier.
pub fn parse_build_settings(stdout: &str) -> ToolResult<AppBundle> {
    let unexpected = |message: String| ToolError::UnexpectedOutput {
        program: "xcodebuild".to_string(),
        message,
    };

    let start = stdout
        .find('[')
        .ok_or_else(|| unexpected("no build settings in output".to_string()))?;
    let entries: Vec<SettingsEntry> =
        serde_json::from_str(&stdout[start..]).map_err(|e| unexpected(e.to_string()))?;

    entries
        .into_iter()
        .find_map(|entry| {
            let setting = |key: &str| entry.build_settings.get(key).and_then(Value::as_str);
            let product = setting("FULL_PRODUCT_NAME").filter(|p| p.ends_with(".app"))?;
            let dir = setting("TARGET_BUILD_DIR")?;
            let bundle_id = setting("PRODUCT_BUNDLE_IDENTIFIER")?;
            Some(AppBundle {
                path: PathBuf::from(dir).join(product),
                bundle_id: bundle_id.to_string(),
                target: entry.target.clone(),
            })
        })
        .ok_or_else(|| unexpected("scheme does not build an application".to_string()))
}

/// How a failing launch step is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    /// The run fails.
    Abort,
    /// The step counts as done if its output contains this text.
    AcceptIf(&'static str),
    /// The failure is logged and ignored.
    Ignore,
}

/// One command in a launch sequence.
#[derive(Debug, Clone)]
pub struct LaunchStep {
    /// Command to run.
    pub script: Script,
    /// Failure handling.
    pub on_failure: OnFailure,
}

impl LaunchStep {
    const fn new(script: Script, on_failure: OnFailure) -> Self {
        Self { script, on_failure }
    }
}

/// Returns the commands that install and start `app` on `destination`.
#[must_use]
pub fn launch_steps(destination: &Destination, app: &AppBundle) -> Vec<LaunchStep> {
    let xcrun = || Script::new("xcrun");
    match destination.kind {
        DestinationKind::Simulator => vec![
            LaunchStep::new(
                xcrun().arg("simctl").arg("boot").arg(&destination.id),
                OnFailure::AcceptIf("current state: Booted"),
            ),
            LaunchStep::new(Script::new("open").arg("-a").arg("Simulator"), OnFailure::Ignore),
            LaunchStep::new(
                xcrun()
                    .arg("simctl")
                    .arg("install")
                    .arg(&destination.id)
                    .path_arg(&app.path),
                OnFailure::Abort,
            ),
            LaunchStep::new(
                xcrun()
                    .arg("simctl")
                    .arg("launch")
                    .arg("--terminate-running-process")
                    .arg(&destination.id)
                    .arg(&app.bundle_id),
                OnFailure::Abort,
            ),
        ],
        DestinationKind::Device => vec![
            LaunchStep::new(
                xcrun()
                    .arg("devicectl")
                    .arg("device")
                    .arg("install")
                    .arg("app")
                    .arg("--device")
                    .arg(&destination.id)
                    .path_arg(&app.path),
                OnFailure::Abort,
            ),
            LaunchStep::new(
                xcrun()
                    .arg("devicectl")
                    .arg("device")
                    .arg("process")
                    .arg("launch")
                    .arg("--terminate-existing")
                    .arg("--device")
                    .arg(&destination.id)
                    .arg(&app.bundle_id),
                OnFailure::Abort,
            ),
        ],
        DestinationKind::Mac => vec![LaunchStep::new(
            Script::new("open").path_arg(&app.path),
            OnFailure::Abort,
        )],
    }
}

/// Runs a launch sequence and returns the output of its last step.
///
/// Each step is bounded by [`DEFAULT_COMMAND_TIMEOUT`], not the build timeout.
async fn run_launch_steps(runner: &CommandRunner, steps: &[LaunchStep]) -> ToolResult<String> {
    let mut last_output = String::new();
    for step in steps {
        let output = runner
            .run_with_timeout(&step.script, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        let combined = format!("{}{}", output.stdout, output.stderr);

        if !output.success() {
            match step.on_failure {
                OnFailure::AcceptIf(marker) if combined.contains(marker) => {}
                OnFailure::Ignore => {
                    warn!(command = %step.script, status = ?output.status, "Optional launch step failed");
                }
                OnFailure::Abort | OnFailure::AcceptIf(_) => {
                    output.into_stdout(step.script.program())?;
                }
            }
        }
        last_output = combined;
    }
    Ok(last_output)
}

/// Outcome of a build-and-run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// The build that preceded the launch.
    pub build: BuildReport,
    /// Whether the app was started.
    pub launched: bool,
    /// The launched bundle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<AppBundle>,
    /// Output of the final launch command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_output: Option<String>,
}

/// Builds `request` and launches the product on its destination.
///
/// A failed build is reported with `launched == false`.
///
/// # Errors
///
/// Returns `NotSelected` without a destination, and an error if a command
/// cannot be run, times out, or a required launch step fails.
pub async fn build_and_run(
    runner: &CommandRunner,
    mut request: BuildRequest,
    tail_bytes: usize,
) -> ToolResult<RunReport> {
    let destination = request.destination.clone().ok_or_else(|| {
        ToolError::NotSelected(
            "no destination selected; call list_destinations and set_state, or pass `destination`"
                .to_string(),
        )
    })?;
    request.action = BuildAction::Build;

    let build = run_build(runner, &request, tail_bytes).await?;
    if !build.succeeded {
        return Ok(RunReport {
            build,
            launched: false,
            app: None,
            launch_output: None,
        });
    }

    let settings = runner
        .stdout(&request.settings_script(), DEFAULT_COMMAND_TIMEOUT)
        .await?;
    let app = parse_build_settings(&settings)?;
    info!(bundle_id = %app.bundle_id, destination = %destination.name, "Launching app");

    let last_output = run_launch_steps(runner, &launch_steps(&destination, &app)).await?;

    Ok(RunReport {
        build,
        launched: true,
        app: Some(app),
        launch_output: Some(tail(last_output.trim(), LAUNCH_OUTPUT_BYTES)),
    })
}
