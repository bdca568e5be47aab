//! Scheme listing via `xcodebuild -list -json`.

use serde::{Deserialize, Serialize};

use crate::error::{ToolError, ToolResult};
use crate::xcode::project::ProjectEntry;
use crate::xcode::shell::{CommandRunner, Script, DEFAULT_COMMAND_TIMEOUT};

/// Schemes, targets and configurations of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemeList {
    /// Container name as reported by `xcodebuild`.
    pub name: String,
    /// Shared schemes.
    pub schemes: Vec<String>,
    /// Targets (projects only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
    /// Build configurations (projects only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub configurations: Vec<String>,
}

#[derive(Deserialize)]
struct ListOutput {
    project: Option<ListBody>,
    workspace: Option<ListBody>,
}

#[derive(Deserialize)]
struct ListBody {
    name: String,
    #[serde(default)]
    schemes: Vec<String>,
    #[serde(default)]
    targets: Vec<String>,
    #[serde(default)]
    configurations: Vec<String>,
}

/// Builds the listing command for `entry`.
#[must_use]
pub fn list_script(entry: &ProjectEntry) -> Script {
    let script = Script::new("xcodebuild").arg("-list").arg("-json");
    match entry.kind.xcodebuild_flag() {
        Some(flag) => script.arg(flag).path_arg(&entry.path),
        None => script.current_dir(entry.working_dir()),
    }
}

/// Parses `xcodebuild -list -json` output.
///
/// Anything printed before the first `{` (xcodebuild occasionally emits
/// warnings on stdout) is ignored.
///
/// # Errors
///
/// Returns `UnexpectedOutput` if no listing object can be decoded.
pub fn parse_list_output(stdout: &str) -> ToolResult<SchemeList> {
    let unexpected = |message: String| ToolError::UnexpectedOutput {
        program: "xcodebuild".to_string(),
        message,
    };

    let start = stdout
        .find('{')
        .ok_or_else(|| unexpected("no JSON object in output".to_string()))?;
    let output: ListOutput =
        serde_json::from_str(&stdout[start..]).map_err(|e| unexpected(e.to_string()))?;

    let body = output
        .workspace
        .or(output.project)
        .ok_or_else(|| unexpected("neither project nor workspace listed".to_string()))?;

    Ok(SchemeList {
        name: body.name,
        schemes: body.schemes,
        targets: body.targets,
        configurations: body.configurations,
    })
}

/// Lists the schemes of `entry`.
///
/// # Errors
///
/// Returns an error if `xcodebuild` fails or its output cannot be parsed.
pub async fn list_schemes(runner: &CommandRunner, entry: &ProjectEntry) -> ToolResult<SchemeList> {
    let script = list_script(entry);
    let stdout = runner.stdout(&script, DEFAULT_COMMAND_TIMEOUT).await?;
    parse_list_output(&stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xcode::project::ProjectKind;
    use std::path::PathBuf;

    const PROJECT_LIST: &str = r#"{
  "project" : {
    "configurations" : [
      "Debug",
      "Release"
    ],
    "name" : "Weather",
    "schemes" : [
      "Weather",
      "WeatherWidget"
    ],
    "targets" : [
      "Weather",
      "WeatherTests",
      "WeatherWidget"
    ]
  }
}"#;

    const WORKSPACE_LIST: &str = r#"Command line invocation:
    /usr/bin/xcodebuild -list -json -workspace Weather.xcworkspace

{
  "workspace" : {
    "name" : "Weather",
    "schemes" : [
      "Pods-Weather",
      "Weather"
    ]
  }
}"#;

    #[test]
    fn parses_project_listing() {
        let list = parse_list_output(PROJECT_LIST).unwrap();
        assert_eq!(list.name, "Weather");
        assert_eq!(list.schemes, ["Weather", "WeatherWidget"]);
        assert_eq!(list.targets.len(), 3);
        assert_eq!(list.configurations, ["Debug", "Release"]);
    }

    #[test]
    fn parses_workspace_listing_after_preamble() {
        let list = parse_list_output(WORKSPACE_LIST).unwrap();
        assert_eq!(list.schemes, ["Pods-Weather", "Weather"]);
        assert!(list.targets.is_empty());

        let json = serde_json::to_value(&list).unwrap();
        assert!(json.get("targets").is_none());
    }

    #[test]
    fn rejects_unrelated_output() {
        assert!(matches!(
            parse_list_output("xcodebuild: error: no project"),
            Err(ToolError::UnexpectedOutput { .. })
        ));
        assert!(matches!(
            parse_list_output("{\"other\": {}}"),
            Err(ToolError::UnexpectedOutput { .. })
        ));
    }

    #[test]
    fn script_selects_container() {
        let workspace = ProjectEntry {
            name: "App".to_string(),
            path: PathBuf::from("/src/App Folder/App.xcworkspace"),
            kind: ProjectKind::Workspace,
        };
        assert_eq!(
            list_script(&workspace).render(),
            "xcodebuild -list -json -workspace '/src/App Folder/App.xcworkspace'"
        );

        let package = ProjectEntry {
            name: "Kit".to_string(),
            path: PathBuf::from("/src/Kit/Package.swift"),
            kind: ProjectKind::SwiftPackage,
        };
        let script = list_script(&package);
        assert_eq!(script.render(), "xcodebuild -list -json");
        assert_eq!(script.to_string(), "(cd /src/Kit && xcodebuild -list -json)");
    }
}
