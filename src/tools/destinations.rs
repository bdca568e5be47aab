//! `list_destinations`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_arguments, ToolContext};
use crate::error::ToolResult;
use crate::mcp::registry::ToolHandler;
use crate::mcp::{ToolCallResult, ToolDefinition};
use crate::xcode::{destination, DestinationKind};

/// Definition of the `list_destinations` tool.
pub fn list_destinations_definition() -> ToolDefinition {
    ToolDefinition::new(
        "list_destinations",
        "List available run destinations: simulators (xcrun simctl), connected devices \
         (xcrun xctrace) and the host Mac. Pass one of the returned objects as \
         `destination` to set_state, build or run.",
        json!({
            "type": "object",
            "properties": {
                "kind": {
                    "type": "string",
                    "enum": ["simulator", "device", "mac"],
                    "description": "Optional: only return destinations of this kind"
                }
            },
            "additionalProperties": false
        }),
    )
}

#[derive(Deserialize)]
struct ListDestinationsArgs {
    #[serde(default)]
    kind: Option<DestinationKind>,
}

/// Handler for `list_destinations`.
pub struct ListDestinations {
    ctx: Arc<ToolContext>,
}

impl ListDestinations {
    /// Creates the handler over a shared context.
    pub fn new(ctx: &Arc<ToolContext>) -> Self {
        Self {
            ctx: Arc::clone(ctx),
        }
    }
}

#[async_trait]
impl ToolHandler for ListDestinations {
    async fn call(&self, arguments: Option<Value>) -> ToolResult<ToolCallResult> {
        let args: ListDestinationsArgs = parse_arguments(arguments)?;
        let mut destinations = destination::list_destinations(&self.ctx.runner).await?;
        if let Some(kind) = args.kind {
            destinations.retain(|d| d.kind == kind);
        }
        ToolCallResult::json(&json!({ "destinations": destinations }))
    }
}
