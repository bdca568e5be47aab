//! `build` and `run`.
//!
//! A build that compiles but fails is a tool result with `isError: true`
//! carrying the report, so the client sees the diagnostics. Failures to run
//! `xcodebuild` at all (missing tooling, timeout) are handler errors.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::selection::destination_schema;
use super::{parse_arguments, ToolContext};
use crate::error::ToolResult;
use crate::mcp::registry::ToolHandler;
use crate::mcp::{ToolCallResult, ToolDefinition};
use crate::xcode::build::run_build;
use crate::xcode::launch::build_and_run;
use crate::xcode::{BuildOptions, BuildRequest};

fn build_schema(with_action: bool) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": {
            "project": {
                "type": "string",
                "description": "Optional: project path (default: selected project)"
            },
            "scheme": {
                "type": "string",
                "description": "Optional: scheme (default: selected scheme)"
            },
            "configuration": {
                "type": "string",
                "description": "Optional: build configuration (default: selected, then configured default)"
            },
            "destination": destination_schema(),
            "timeout_secs": {
                "type": "integer",
                "minimum": 1,
                "description": "Optional: override the configured build timeout"
            }
        },
        "additionalProperties": false
    });
    if with_action {
        schema["properties"]["action"] = json!({
            "type": "string",
            "enum": ["build", "clean", "test"],
            "description": "Optional: xcodebuild action (default: build)"
        });
    }
    schema
}

/// Definition of the `build` tool.
pub fn build_definition() -> ToolDefinition {
    ToolDefinition::new(
        "build",
        "Build, clean or test with xcodebuild using the saved selection, overridden by any \
         arguments given. Returns the exit status, compiler errors and the tail of the \
         build log. A failed build is reported with isError set.",
        build_schema(true),
    )
}

/// Handler for `build`.
pub struct Build {
    ctx: Arc<ToolContext>,
}

impl Build {
    /// Creates the handler over a shared context.
    pub fn new(ctx: &Arc<ToolContext>) -> Self {
        Self {
            ctx: Arc::clone(ctx),
        }
    }
}

#[async_trait]
impl ToolHandler for Build {
    async fn call(&self, arguments: Option<Value>) -> ToolResult<ToolCallResult> {
        let options: BuildOptions = parse_arguments(arguments)?;
        let state = self.ctx.state.load().await?;
        let request = BuildRequest::resolve(options, &state, &self.ctx.config.build)?;

        let tail_bytes = self.ctx.config.build.output_tail_bytes;
        let report = run_build(&self.ctx.runner, &request, tail_bytes).await?;
        let mut result = ToolCallResult::json(&report)?;
        result.is_error = !report.succeeded;
        Ok(result)
    }
}

/// Definition of the `run` tool.
pub fn run_definition() -> ToolDefinition {
    ToolDefinition::new(
        "run",
        "Build the selected scheme and launch the app on the selected destination: boots \
         and installs on a simulator, installs via devicectl on a device, or opens the app \
         on the Mac. Requires a destination.",
        build_schema(false),
    )
}

/// Handler for `run`: build, install, launch.
pub struct Run {
    ctx: Arc<ToolContext>,
}

impl Run {
    /// Creates the handler over a shared context.
    pub fn new(ctx: &Arc<ToolContext>) -> Self {
        Self {
            ctx: Arc::clone(ctx),
        }
    }
}

#[async_trait]
impl ToolHandler for Run {
    async fn call(&self, arguments: Option<Value>) -> ToolResult<ToolCallResult> {
        let options: BuildOptions = parse_arguments(arguments)?;
        let state = self.ctx.state.load().await?;
        let request = BuildRequest::resolve(options, &state, &self.ctx.config.build)?;

        let tail_bytes = self.ctx.config.build.output_tail_bytes;
        let report = build_and_run(&self.ctx.runner, request, tail_bytes).await?;
        let mut result = ToolCallResult::json(&report)?;
        result.is_error = !report.launched;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ToolError;
    use crate::mcp::schema;

    fn context(dir: &std::path::Path) -> Arc<ToolContext> {
        let config = Config {
            state_path: Some(dir.join("state.json")),
            ..Config::default()
        };
        Arc::new(ToolContext::new(config))
    }

    #[tokio::test]
    async fn build_without_selection_is_not_selected() {
        let dir = tempfile::tempdir().unwrap();
        let err = Build::new(&context(dir.path())).call(None).await.unwrap_err();
        assert!(matches!(err, ToolError::NotSelected(_)));
    }

    #[tokio::test]
    async fn run_without_destination_is_not_selected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("App.xcodeproj")).unwrap();
        let err = Run::new(&context(dir.path()))
            .call(Some(json!({
                "project": dir.path().join("App.xcodeproj"),
                "scheme": "App"
            })))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no destination selected"));
    }

    #[test]
    fn only_build_accepts_an_action() {
        let args = json!({"action": "test"});
        assert!(schema::validate(&build_definition().input_schema, &args).is_ok());
        assert!(schema::validate(&run_definition().input_schema, &args).is_err());
        assert!(schema::validate(&build_definition().input_schema, &json!({"timeout_secs": 0})).is_err());
    }
}
