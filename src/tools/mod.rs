//! MCP tools and resources for Xcode.
//!
//! Each tool is a small handler struct holding a shared [`ToolContext`].
//! [`dispatcher`] registers all of them in the order clients see them in
//! `tools/list`.

mod build;
mod destinations;
mod guidance;
mod projects;
mod selection;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{self, Config};
use crate::error::{ToolError, ToolResult};
use crate::mcp::{Dispatcher, ResourceRegistry, ToolRegistry};
use crate::xcode::{CommandRunner, StateStore};

pub use guidance::GUIDANCE;

/// Text returned to clients in the `initialize` result.
pub const INSTRUCTIONS: &str = "Tools for building and running Xcode projects. \
    Start with list_projects, list_schemes and list_destinations, save a selection \
    with set_state, then call build or run. Read get_configuration_guidance if a \
    build fails for signing or destination reasons.";

/// Shared state for all tool handlers.
pub struct ToolContext {
    /// Loaded configuration.
    pub config: Config,
    /// Directories searched by `list_projects`.
    pub search_paths: Vec<PathBuf>,
    /// Command runner for `xcodebuild` and `xcrun`.
    pub runner: CommandRunner,
    /// Persisted selection.
    pub state: StateStore,
}

impl ToolContext {
    /// Builds the context from a validated configuration.
    ///
    /// An empty `search_paths` list means the current directory.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let search_paths = if config.search_paths.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            config.search_paths.clone()
        };
        let runner = CommandRunner::new(
            Duration::from_secs(config.build.timeout_secs),
            config.build.max_output_bytes,
        );
        let state = StateStore::new(config::state_path(&config));

        Self {
            config,
            search_paths,
            runner,
            state,
        }
    }
}

/// Decodes tool arguments into `T`. Missing arguments decode as `{}`.
///
/// # Errors
///
/// Returns `InvalidArguments` if the arguments do not match `T`.
pub(crate) fn parse_arguments<T: DeserializeOwned>(arguments: Option<Value>) -> ToolResult<T> {
    let value = arguments.unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    serde_json::from_value(value).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Registers every tool against `ctx`.
#[must_use]
pub fn tool_registry(ctx: &Arc<ToolContext>) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(projects::list_projects_definition(), projects::ListProjects::new(ctx));
    tools.register(projects::list_schemes_definition(), projects::ListSchemes::new(ctx));
    tools.register(
        destinations::list_destinations_definition(),
        destinations::ListDestinations::new(ctx),
    );
    tools.register(selection::get_state_definition(), selection::GetState::new(ctx));
    tools.register(selection::set_state_definition(), selection::SetState::new(ctx));
    tools.register(build::build_definition(), build::Build::new(ctx));
    tools.register(build::run_definition(), build::Run::new(ctx));
    tools.register(guidance::guidance_definition(), guidance::Guidance);
    tools
}

/// Registers every resource against `ctx`.
#[must_use]
pub fn resource_registry(ctx: &Arc<ToolContext>) -> ResourceRegistry {
    let mut resources = ResourceRegistry::new();
    resources.register(selection::state_resource_definition(), selection::StateResource::new(ctx));
    resources.register(guidance::guidance_resource_definition(), guidance::Guidance);
    resources
}

/// Builds a dispatcher exposing all Xcode tools and resources.
#[must_use]
pub fn dispatcher(ctx: ToolContext) -> Dispatcher {
    let ctx = Arc::new(ctx);
    Dispatcher::new(tool_registry(&ctx), resource_registry(&ctx)).with_instructions(INSTRUCTIONS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::schema;

    fn context() -> Arc<ToolContext> {
        Arc::new(ToolContext::new(Config::default()))
    }

    #[test]
    fn registers_all_tools_in_order() {
        let tools = tool_registry(&context());
        let names: Vec<_> = tools.definitions().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "list_projects",
                "list_schemes",
                "list_destinations",
                "get_state",
                "set_state",
                "build",
                "run",
                "get_configuration_guidance",
            ]
        );
    }

    #[test]
    fn tool_definitions_are_valid_object_schemas() {
        for def in tool_registry(&context()).definitions() {
            assert!(!def.description.is_empty(), "{} has no description", def.name);
            assert_eq!(def.input_schema["type"], "object", "{}", def.name);
            assert!(
                schema::validate(&def.input_schema, &serde_json::json!({})).is_ok()
                    || def.input_schema.get("required").is_some(),
                "{} rejects empty arguments without declaring required fields",
                def.name
            );
        }
    }

    #[test]
    fn registers_resources() {
        let resources = resource_registry(&context());
        let uris: Vec<_> = resources.definitions().map(|d| d.uri.as_str()).collect();
        assert_eq!(uris, ["xcode://state", "xcode://guidance"]);
    }

    #[test]
    fn empty_search_paths_default_to_current_dir() {
        assert_eq!(context().search_paths, [PathBuf::from(".")]);
    }

    #[test]
    fn parse_arguments_treats_missing_as_empty_object() {
        #[derive(serde::Deserialize, Default, Debug)]
        struct Args {
            #[serde(default)]
            name: Option<String>,
        }

        let args: Args = parse_arguments(None).unwrap();
        assert!(args.name.is_none());

        let err = parse_arguments::<Args>(Some(serde_json::json!({"name": 5}))).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
