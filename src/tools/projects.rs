//! `list_projects` and `list_schemes`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{parse_arguments, ToolContext};
use crate::error::{ToolError, ToolResult};
use crate::mcp::registry::ToolHandler;
use crate::mcp::{ToolCallResult, ToolDefinition};
use crate::xcode::{project, scheme, ProjectEntry};

/// Definition of the `list_projects` tool.
pub fn list_projects_definition() -> ToolDefinition {
    ToolDefinition::new(
        "list_projects",
        "Find Xcode workspaces (.xcworkspace), projects (.xcodeproj) and Swift packages \
         (Package.swift) under the configured search paths. Pass search_path to look \
         somewhere else. Workspaces embedded inside .xcodeproj bundles are omitted.",
        json!({
            "type": "object",
            "properties": {
                "search_path": {
                    "type": "string",
                    "description": "Optional: directory to search instead of the configured search paths"
                }
            },
            "additionalProperties": false
        }),
    )
}

#[derive(Deserialize)]
struct ListProjectsArgs {
    #[serde(default)]
    search_path: Option<PathBuf>,
}

#[derive(Serialize)]
struct ProjectListing {
    search_paths: Vec<PathBuf>,
    projects: Vec<ProjectEntry>,
}

/// Handler for `list_projects`.
pub struct ListProjects {
    ctx: Arc<ToolContext>,
}

impl ListProjects {
    /// Creates the handler over a shared context.
    pub fn new(ctx: &Arc<ToolContext>) -> Self {
        Self {
            ctx: Arc::clone(ctx),
        }
    }
}

#[async_trait]
impl ToolHandler for ListProjects {
    async fn call(&self, arguments: Option<Value>) -> ToolResult<ToolCallResult> {
        let args: ListProjectsArgs = parse_arguments(arguments)?;
        let search_paths = match args.search_path {
            Some(path) if !path.is_dir() => {
                return Err(ToolError::NotFound(format!("directory {}", path.display())));
            }
            Some(path) => vec![path],
            None => self.ctx.search_paths.clone(),
        };

        let roots = search_paths.clone();
        let discovery = self.ctx.config.discovery.clone();
        let projects = tokio::task::spawn_blocking(move || project::discover(&roots, &discovery))
            .await
            .map_err(|e| ToolError::Io(std::io::Error::other(e)))?;

        ToolCallResult::json(&ProjectListing {
            search_paths,
            projects,
        })
    }
}

/// Definition of the `list_schemes` tool.
pub fn list_schemes_definition() -> ToolDefinition {
    ToolDefinition::new(
        "list_schemes",
        "List the schemes, targets and build configurations of a workspace, project or \
         Swift package using `xcodebuild -list`. Defaults to the selected project.",
        json!({
            "type": "object",
            "properties": {
                "project": {
                    "type": "string",
                    "description": "Optional: path of the .xcworkspace, .xcodeproj or package directory (default: selected project)"
                }
            },
            "additionalProperties": false
        }),
    )
}

#[derive(Deserialize)]
struct ListSchemesArgs {
    #[serde(default)]
    project: Option<PathBuf>,
}

/// Handler for `list_schemes`. Falls back to the selected project.
pub struct ListSchemes {
    ctx: Arc<ToolContext>,
}

impl ListSchemes {
    /// Creates the handler over a shared context.
    pub fn new(ctx: &Arc<ToolContext>) -> Self {
        Self {
            ctx: Arc::clone(ctx),
        }
    }
}

#[async_trait]
impl ToolHandler for ListSchemes {
    async fn call(&self, arguments: Option<Value>) -> ToolResult<ToolCallResult> {
        let args: ListSchemesArgs = parse_arguments(arguments)?;
        let path = match args.project {
            Some(path) => path,
            None => self.ctx.state.load().await?.project.ok_or_else(|| {
                ToolError::NotSelected(
                    "no project selected; call list_projects and set_state, or pass `project`"
                        .to_string(),
                )
            })?,
        };

        let entry = ProjectEntry::from_path(&path)?;
        let schemes = scheme::list_schemes(&self.ctx.runner, &entry).await?;
        ToolCallResult::json(&schemes)
    }
}
