//! `get_configuration_guidance` and the `xcode://guidance` resource.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolResult;
use crate::mcp::registry::{ResourceHandler, ToolHandler};
use crate::mcp::{ResourceDefinition, ToolCallResult, ToolDefinition};

/// Markdown guide for configuring the server and fixing common build setups.
pub const GUIDANCE: &str = r#"# Xcode tools configuration

## Typical workflow

1. `list_projects` to find workspaces, projects and Swift packages.
2. `list_schemes` for the chosen project.
3. `list_destinations` for simulators, devices and the Mac.
4. `set_state` with `project`, `scheme` and `destination` (pass a destination
   object exactly as returned by `list_destinations`).
5. `build` or `run`. Arguments override the saved selection for one call.

Prefer the `.xcworkspace` over the `.xcodeproj` when both exist (CocoaPods and
multi-project setups only build correctly from the workspace).

## Configuration file

`~/.xcode-tools-mcp/config.json`, or the path given as the first argument:

```json
{
  "search_paths": ["/Users/me/Developer"],
  "discovery": { "max_depth": 3, "ignore": ["Pods", ".build", "DerivedData"] },
  "build": {
    "timeout_secs": 900,
    "default_configuration": "Debug",
    "derived_data_path": null
  },
  "logging": { "level": "warn" }
}
```

`--search-path <DIR>` on the command line replaces `search_paths`.

## Common failures

- **Signing for "App" requires a development team**: open the project in Xcode
  once and pick a team under Signing & Capabilities, or build for a simulator.
- **Unable to find a destination matching the provided destination specifier**:
  the simulator runtime is missing or the scheme does not support that
  platform. Re-run `list_destinations` and pick another.
- **xcodebuild: error: ... does not contain a scheme named**: schemes must be
  shared (Product > Scheme > Manage Schemes > Shared) to be listed.
- **timed out**: raise `build.timeout_secs` or pass `timeout_secs` to `build`.
- **xcrun: error: unable to find utility**: select a full Xcode with
  `sudo xcode-select -s /Applications/Xcode.app`.
"#;

/// Definition of the `get_configuration_guidance` tool.
pub fn guidance_definition() -> ToolDefinition {
    ToolDefinition::new(
        "get_configuration_guidance",
        "Explain the recommended workflow, the configuration file format, and fixes for \
         common xcodebuild failures (signing, destinations, unshared schemes).",
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    )
}

/// Definition of the `xcode://guidance` resource.
pub fn guidance_resource_definition() -> ResourceDefinition {
    ResourceDefinition {
        uri: "xcode://guidance".to_string(),
        name: "Configuration guidance".to_string(),
        description: Some("Workflow, configuration and troubleshooting guide".to_string()),
        mime_type: Some("text/markdown".to_string()),
    }
}

/// Serves [`GUIDANCE`] as both a tool and a resource.
pub struct Guidance;

#[async_trait]
impl ToolHandler for Guidance {
    async fn call(&self, _arguments: Option<Value>) -> ToolResult<ToolCallResult> {
        Ok(ToolCallResult::text(GUIDANCE))
    }
}

#[async_trait]
impl ResourceHandler for Guidance {
    async fn read(&self) -> ToolResult<String> {
        Ok(GUIDANCE.to_string())
    }
}
