//! Run destinations: simulators, physical devices and the host Mac.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ToolError, ToolResult};
use crate::xcode::shell::{CommandRunner, Script, DEFAULT_COMMAND_TIMEOUT};

const RUNTIME_PREFIX: &str = "com.apple.CoreSimulator.SimRuntime.";

/// Where a destination runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// An iOS, watchOS, tvOS or visionOS simulator.
    Simulator,
    /// A connected physical device.
    Device,
    /// The host Mac.
    Mac,
}

/// A build and run destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Destination kind.
    pub kind: DestinationKind,
    /// Simulator UDID or device identifier. Empty for the host Mac.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// OS name and version, e.g. `iOS 17.2`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    /// Simulator state, e.g. `Booted` or `Shutdown`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl Destination {
    /// The host Mac.
    #[must_use]
    pub fn mac() -> Self {
        Self {
            kind: DestinationKind::Mac,
            id: String::new(),
            name: "My Mac".to_string(),
            os: Some("macOS".to_string()),
            state: None,
        }
    }

    /// Returns the `-destination` specifier understood by `xcodebuild`.
    #[must_use]
    pub fn specifier(&self) -> String {
        match self.kind {
            DestinationKind::Mac => "platform=macOS".to_string(),
            DestinationKind::Simulator | DestinationKind::Device => format!("id={}", self.id),
        }
    }

    /// Checks that a destination supplied by a client is usable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArguments` if a simulator or device has no id.
    pub fn validate(&self) -> ToolResult<()> {
        if self.kind != DestinationKind::Mac && self.id.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "destination id is required for simulators and devices".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct SimctlDevices {
    devices: BTreeMap<String, Vec<SimctlDevice>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimctlDevice {
    udid: String,
    name: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default = "available_by_default")]
    is_available: bool,
}

const fn available_by_default() -> bool {
    true
}

/// Turns `com.apple.CoreSimulator.SimRuntime.iOS-17-2` into `iOS 17.2`.
fn runtime_display_name(identifier: &str) -> String {
    let short = identifier.strip_prefix(RUNTIME_PREFIX).unwrap_or(identifier);
    match short.split_once('-') {
        Some((os, version)) => format!("{os} {}", version.replace('-', ".")),
        None => short.to_string(),
    }
}

/// Parses `xcrun simctl list devices available --json`.
///
/// Unavailable simulators are dropped. Results are ordered by runtime, then
/// by name.
///
/// # Errors
///
/// Returns `UnexpectedOutput` if the JSON cannot be decoded.
pub fn parse_simctl_devices(stdout: &str) -> ToolResult<Vec<Destination>> {
    let parsed: SimctlDevices =
        serde_json::from_str(stdout).map_err(|e| ToolError::UnexpectedOutput {
            program: "simctl".to_string(),
            message: e.to_string(),
        })?;

    let mut destinations: Vec<_> = parsed
        .devices
        .into_iter()
        .flat_map(|(runtime, devices)| {
            let os = runtime_display_name(&runtime);
            devices
                .into_iter()
                .filter(|d| d.is_available)
                .map(move |d| Destination {
                    kind: DestinationKind::Simulator,
                    id: d.udid,
                    name: d.name,
                    os: Some(os.clone()),
                    state: d.state,
                })
        })
        .collect();

    destinations.sort_by(|a, b| a.os.cmp(&b.os).then_with(|| a.name.cmp(&b.name)));
    Ok(destinations)
}

fn device_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<name>.+?) \((?P<os>\d[\d.]*)\) \((?P<id>[0-9A-Fa-f-]+)\)$")
            .expect("device line regex is valid")
    })
}

/// Parses the `== Devices ==` section of `xcrun xctrace list devices`.
///
/// Offline devices, simulators and the host Mac (which has no OS version in
/// its line) are not returned.
#[must_use]
pub fn parse_xctrace_devices(stdout: &str) -> Vec<Destination> {
    let mut in_devices = false;
    let mut destinations = Vec::new();

    for line in stdout.lines().map(str::trim) {
        if line.starts_with("==") {
            in_devices = line == "== Devices ==";
            continue;
        }
        if !in_devices || line.is_empty() {
            continue;
        }
        if let Some(caps) = device_line().captures(line) {
            destinations.push(Destination {
                kind: DestinationKind::Device,
                id: caps["id"].to_string(),
                name: caps["name"].to_string(),
                os: Some(caps["os"].to_string()),
                state: None,
            });
        }
    }

    destinations
}

/// Lists simulators, connected devices and the host Mac.
///
/// A failure to list physical devices is logged and yields none, since it
/// usually means no device tooling is installed.
///
/// # Errors
///
/// Returns an error if the simulator list cannot be obtained.
pub async fn list_destinations(runner: &CommandRunner) -> ToolResult<Vec<Destination>> {
    let simulators = Script::new("xcrun")
        .arg("simctl")
        .arg("list")
        .arg("devices")
        .arg("available")
        .arg("--json");
    let stdout = runner.stdout(&simulators, DEFAULT_COMMAND_TIMEOUT).await?;
    let mut destinations = parse_simctl_devices(&stdout)?;

    let devices = Script::new("xcrun").arg("xctrace").arg("list").arg("devices");
    match runner.stdout(&devices, DEFAULT_COMMAND_TIMEOUT).await {
        Ok(stdout) => destinations.extend(parse_xctrace_devices(&stdout)),
        Err(e) => warn!(error = %e, "Could not list physical devices"),
    }

    destinations.push(Destination::mac());
    Ok(destinations)
}
