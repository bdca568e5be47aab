//! `get_state`, `set_state` and the `xcode://state` resource.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_arguments, ToolContext};
use crate::error::{ToolError, ToolResult};
use crate::mcp::registry::{ResourceHandler, ToolHandler};
use crate::mcp::{ResourceDefinition, ToolCallResult, ToolDefinition};
use crate::xcode::{ProjectEntry, SelectionState, SelectionUpdate};

/// Schema of a destination object as returned by `list_destinations`.
pub fn destination_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "kind": { "type": "string", "enum": ["simulator", "device", "mac"] },
            "id": { "type": "string", "description": "Simulator UDID or device identifier" },
            "name": { "type": "string" },
            "os": { "type": "string" },
            "state": { "type": "string" }
        },
        "required": ["kind"],
        "additionalProperties": false
    })
}

fn state_json(ctx: &ToolContext, state: &SelectionState) -> Value {
    json!({
        "state_path": ctx.state.path(),
        "selection": state,
    })
}

/// Definition of the `get_state` tool.
pub fn get_state_definition() -> ToolDefinition {
    ToolDefinition::new(
        "get_state",
        "Return the saved selection (project, scheme, configuration, destination) used \
         as defaults by list_schemes, build and run.",
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    )
}

/// Handler for `get_state`.
pub struct GetState {
    ctx: Arc<ToolContext>,
}

impl GetState {
    /// Creates the handler over a shared context.
    pub fn new(ctx: &Arc<ToolContext>) -> Self {
        Self {
            ctx: Arc::clone(ctx),
        }
    }
}

#[async_trait]
impl ToolHandler for GetState {
    async fn call(&self, _arguments: Option<Value>) -> ToolResult<ToolCallResult> {
        let state = self.ctx.state.load().await?;
        ToolCallResult::json(&state_json(&self.ctx, &state))
    }
}

/// Definition of the `set_state` tool.
pub fn set_state_definition() -> ToolDefinition {
    ToolDefinition::new(
        "set_state",
        "Update the saved selection. Only the given fields change; selecting a different \
         project clears the scheme unless one is given too. Set reset to true to clear \
         everything first.",
        json!({
            "type": "object",
            "properties": {
                "project": {
                    "type": "string",
                    "description": "Path of the .xcworkspace, .xcodeproj or package directory"
                },
                "scheme": { "type": "string" },
                "configuration": {
                    "type": "string",
                    "description": "Build configuration, e.g. Debug or Release"
                },
                "destination": destination_schema(),
                "reset": {
                    "type": "boolean",
                    "description": "Optional: clear the selection before applying the other fields"
                }
            },
            "additionalProperties": false
        }),
    )
}

/// Handler for `set_state`.
pub struct SetState {
    ctx: Arc<ToolContext>,
}

impl SetState {
    /// Creates the handler over a shared context.
    pub fn new(ctx: &Arc<ToolContext>) -> Self {
        Self {
            ctx: Arc::clone(ctx),
        }
    }
}

#[async_trait]
impl ToolHandler for SetState {
    async fn call(&self, arguments: Option<Value>) -> ToolResult<ToolCallResult> {
        let mut update: SelectionUpdate = parse_arguments(arguments)?;
        if update.is_empty() {
            return Err(ToolError::InvalidArguments(
                "nothing to change; pass at least one field".to_string(),
            ));
        }

        if let Some(path) = update.project.take() {
            update.project = Some(ProjectEntry::from_path(&path)?.path);
        }
        if let Some(destination) = &update.destination {
            destination.validate()?;
        }

        let state = self.ctx.state.update(update).await?;
        info!(
            project = ?state.project,
            scheme = ?state.scheme,
            "Selection updated"
        );
        ToolCallResult::json(&state_json(&self.ctx, &state))
    }
}

/// Definition of the `xcode://state` resource.
pub fn state_resource_definition() -> ResourceDefinition {
    ResourceDefinition {
        uri: "xcode://state".to_string(),
        name: "Current selection".to_string(),
        description: Some("Saved project, scheme, configuration and destination".to_string()),
        mime_type: Some("application/json".to_string()),
    }
}

/// Serves the saved selection as `xcode://state`.
pub struct StateResource {
    ctx: Arc<ToolContext>,
}

impl StateResource {
    /// Creates the handler over a shared context.
    pub fn new(ctx: &Arc<ToolContext>) -> Self {
        Self {
            ctx: Arc::clone(ctx),
        }
    }
}

#[async_trait]
impl ResourceHandler for StateResource {
    async fn read(&self) -> ToolResult<String> {
        let state = self.ctx.state.load().await?;
        Ok(serde_json::to_string_pretty(&state_json(&self.ctx, &state))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mcp::registry::ToolContent;
    use crate::mcp::schema;

    fn context(dir: &std::path::Path) -> Arc<ToolContext> {
        let config = Config {
            state_path: Some(dir.join("state.json")),
            ..Config::default()
        };
        Arc::new(ToolContext::new(config))
    }

    fn body(result: &ToolCallResult) -> Value {
        let ToolContent::Text { text } = &result.content[0];
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn get_state_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let result = GetState::new(&context(dir.path())).call(None).await.unwrap();
        assert_eq!(body(&result)["selection"], json!({}));
    }

    #[tokio::test]
    async fn set_state_persists_and_canonicalises_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Kit")).unwrap();
        std::fs::write(dir.path().join("Kit/Package.swift"), "").unwrap();
        let ctx = context(dir.path());

        let result = SetState::new(&ctx)
            .call(Some(json!({
                "project": dir.path().join("Kit"),
                "scheme": "Kit",
                "destination": {"kind": "mac"}
            })))
            .await
            .unwrap();
        let selection = &body(&result)["selection"];
        assert!(selection["project"].as_str().unwrap().ends_with("Package.swift"));
        assert_eq!(selection["destination"]["kind"], "mac");

        let stored = StateResource::new(&ctx).read().await.unwrap();
        let stored: Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(stored["selection"]["scheme"], "Kit");
    }

    #[tokio::test]
    async fn set_state_rejects_empty_update() {
        let dir = tempfile::tempdir().unwrap();
        let err = SetState::new(&context(dir.path()))
            .call(Some(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn set_state_rejects_unknown_project() {
        let dir = tempfile::tempdir().unwrap();
        let err = SetState::new(&context(dir.path()))
            .call(Some(json!({"project": dir.path().join("Nope.xcodeproj")})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn destination_schema_rejects_unknown_kind() {
        let schema = set_state_definition().input_schema;
        assert!(schema::validate(&schema, &json!({"destination": {"kind": "watch"}})).is_err());
        assert!(schema::validate(&schema, &json!({"destination": {"kind": "simulator", "id": "X"}})).is_ok());
    }
}
