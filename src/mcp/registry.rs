//! Tool and resource registries.
//!
//! A registry maps a unique name (or URI) to a definition and a handler.
//! Registries are filled once while the server is assembled and are only
//! read afterwards. Registering an existing name replaces its definition and
//! handler but keeps its original position, so listings stay in first
//! registration order.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::ToolResult;

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool, so we must take &bool here
const fn is_false(b: &bool) -> bool {
    !*b
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Creates a tool definition.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A resource definition for resources/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    /// Unique resource URI.
    pub uri: String,
    /// Short display name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the content produced by the handler.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool ran but reported a negative outcome.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Creates a text result holding pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be serialised.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> ToolResult<Self> {
        Ok(Self::text(serde_json::to_string_pretty(value)?))
    }
}

/// Executes one tool invocation.
///
/// `arguments` is the raw `arguments` member of a `tools/call` request. By
/// the time a handler runs it has already been validated against the tool's
/// input schema.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool.
    async fn call(&self, arguments: Option<Value>) -> ToolResult<ToolCallResult>;
}

/// Produces the content of one resource.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Reads the resource.
    async fn read(&self) -> ToolResult<String>;
}

/// Adapter turning an async closure into a [`ToolHandler`].
pub struct FnToolHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnToolHandler<F>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = ToolResult<ToolCallResult>> + Send,
{
    async fn call(&self, arguments: Option<Value>) -> ToolResult<ToolCallResult> {
        (self.0)(arguments).await
    }
}

/// Adapter turning an async closure into a [`ResourceHandler`].
pub struct FnResourceHandler<F>(F);

#[async_trait]
impl<F, Fut> ResourceHandler for FnResourceHandler<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ToolResult<String>> + Send,
{
    async fn read(&self) -> ToolResult<String> {
        (self.0)().await
    }
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Ordered registry of tools keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any tool with the same name.
    ///
    /// Returns `true` if an existing registration was replaced.
    pub fn register<H>(&mut self, definition: ToolDefinition, handler: H) -> bool
    where
        H: ToolHandler + 'static,
    {
        let name = definition.name.clone();
        let replaced = self
            .tools
            .insert(
                name.clone(),
                RegisteredTool {
                    definition,
                    handler: Arc::new(handler),
                },
            )
            .is_some();

        if replaced {
            tracing::debug!(tool = %name, "Replaced previously registered tool");
        }
        replaced
    }

    /// Registers an async closure as a tool.
    pub fn register_fn<F, Fut>(&mut self, definition: ToolDefinition, f: F) -> bool
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<ToolCallResult>> + Send + 'static,
    {
        self.register(definition, FnToolHandler(f))
    }

    /// Returns all definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values().map(|t| &t.definition)
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<(&ToolDefinition, Arc<dyn ToolHandler>)> {
        self.tools
            .get(name)
            .map(|t| (&t.definition, Arc::clone(&t.handler)))
    }

    /// Returns `true` if a tool with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

struct RegisteredResource {
    definition: ResourceDefinition,
    handler: Arc<dyn ResourceHandler>,
}

/// Ordered registry of resources keyed by URI.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: IndexMap<String, RegisteredResource>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource, replacing any resource with the same URI.
    ///
    /// Returns `true` if an existing registration was replaced.
    pub fn register<H>(&mut self, definition: ResourceDefinition, handler: H) -> bool
    where
        H: ResourceHandler + 'static,
    {
        let uri = definition.uri.clone();
        let replaced = self
            .resources
            .insert(
                uri.clone(),
                RegisteredResource {
                    definition,
                    handler: Arc::new(handler),
                },
            )
            .is_some();

        if replaced {
            tracing::debug!(uri = %uri, "Replaced previously registered resource");
        }
        replaced
    }

    /// Registers an async closure as a resource.
    pub fn register_fn<F, Fut>(&mut self, definition: ResourceDefinition, f: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<String>> + Send + 'static,
    {
        self.register(definition, FnResourceHandler(f))
    }

    /// Returns all definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.resources.values().map(|r| &r.definition)
    }

    /// Looks up a resource by URI.
    #[must_use]
    pub fn get(&self, uri: &str) -> Option<(&ResourceDefinition, Arc<dyn ResourceHandler>)> {
        self.resources
            .get(uri)
            .map(|r| (&r.definition, Arc::clone(&r.handler)))
    }

    /// Returns the number of registered resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if no resources are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(name: &str, description: &str) -> ToolDefinition {
        ToolDefinition::new(name, description, json!({"type": "object"}))
    }

    #[test]
    fn tool_call_result_text() {
        let result = ToolCallResult::text("Hello, world!");
        assert!(!result.is_error);
        assert_eq!(result.content.len(), 1);

        match &result.content[0] {
            ToolContent::Text { text } => assert_eq!(text, "Hello, world!"),
        }
    }

    #[test]
    fn tool_call_result_error() {
        let result = ToolCallResult::error("Something went wrong");
        assert!(result.is_error);
        assert_eq!(result.content.len(), 1);

        match &result.content[0] {
            ToolContent::Text { text } => assert_eq!(text, "Something went wrong"),
        }
    }

    #[test]
    fn tool_call_result_serialises_as_mcp_content() {
        let value = serde_json::to_value(ToolCallResult::text("{}")).unwrap();
        assert_eq!(value, json!({"content": [{"type": "text", "text": "{}"}]}));

        let value = serde_json::to_value(ToolCallResult::error("bad")).unwrap();
        assert_eq!(value["isError"], true);
    }

    #[test]
    fn definitions_keep_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["list_projects", "build", "run", "get_state"] {
            registry.register_fn(definition(name, name), |_| async {
                Ok(ToolCallResult::text("ok"))
            });
        }

        let names: Vec<_> = registry.definitions().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["list_projects", "build", "run", "get_state"]);
    }

    #[tokio::test]
    async fn duplicate_registration_overwrites_in_place() {
        let mut registry = ToolRegistry::new();
        assert!(!registry.register_fn(definition("a", "first"), |_| async {
            Ok(ToolCallResult::text("first"))
        }));
        registry.register_fn(definition("b", "other"), |_| async {
            Ok(ToolCallResult::text("b"))
        });
        assert!(registry.register_fn(definition("a", "second"), |_| async {
            Ok(ToolCallResult::text("second"))
        }));

        assert_eq!(registry.len(), 2);
        let first = registry.definitions().next().unwrap();
        assert_eq!(first.name, "a");
        assert_eq!(first.description, "second");

        let (_, handler) = registry.get("a").unwrap();
        let result = handler.call(None).await.unwrap();
        assert_eq!(result.content[0], ToolContent::Text { text: "second".to_string() });
    }

    #[tokio::test]
    async fn resources_are_looked_up_by_uri() {
        let mut registry = ResourceRegistry::new();
        registry.register_fn(
            ResourceDefinition {
                uri: "xcode://guidance".to_string(),
                name: "guidance".to_string(),
                description: None,
                mime_type: Some("text/markdown".to_string()),
            },
            || async { Ok("# Guidance".to_string()) },
        );

        assert_eq!(registry.len(), 1);
        assert!(registry.get("xcode://missing").is_none());
        let (def, handler) = registry.get("xcode://guidance").unwrap();
        assert_eq!(def.mime_type.as_deref(), Some("text/markdown"));
        assert_eq!(handler.read().await.unwrap(), "# Guidance");
    }
}
