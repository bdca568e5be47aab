//! Request dispatch.
//!
//! The dispatcher maps one decoded request to exactly one method handler and
//! always produces exactly one outgoing envelope carrying the request's ID.
//! Handler failures and panics are converted into internal errors here and
//! never reach the transport loop.

use std::future::Future;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::ToolResult;
use crate::mcp::protocol::{
    ErrorCode, JsonRpcError, JsonRpcErrorData, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, OutgoingMessage, RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::registry::{ResourceRegistry, ToolRegistry};
use crate::mcp::schema;

/// MIME type reported for resources that do not declare one.
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListCapabilities>,
    /// Resource-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ListCapabilities>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ListCapabilities::default()),
            resources: Some(ListCapabilities::default()),
        }
    }
}

/// Capabilities of a listable registry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListCapabilities {
    /// Whether the list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Routes requests to method handlers over a fixed pair of registries.
pub struct Dispatcher {
    tools: ToolRegistry,
    resources: ResourceRegistry,
    server_info: ServerInfo,
    instructions: Option<String>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given registries.
    #[must_use]
    pub fn new(tools: ToolRegistry, resources: ResourceRegistry) -> Self {
        Self {
            tools,
            resources,
            server_info: ServerInfo::default(),
            instructions: None,
        }
    }

    /// Sets the `instructions` text returned from `initialize`.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Returns the tool registry.
    #[must_use]
    pub const fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Returns the resource registry.
    #[must_use]
    pub const fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Handles one request and returns the reply for it.
    pub async fn dispatch(&self, req: JsonRpcRequest) -> OutgoingMessage {
        let started = Instant::now();
        debug!(id = %req.id, method = %req.method, "Dispatching request");

        let result = match req.method.as_str() {
            "initialize" => Ok(self.handle_initialize(&req)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(&req).await,
            "resources/list" => Ok(self.handle_resources_list()),
            "resources/read" => self.handle_resources_read(&req).await,
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        let reply: OutgoingMessage = match result {
            Ok(value) => JsonRpcResponse::success(req.id, value).into(),
            Err(error) => error.into(),
        };

        debug!(
            method = %req.method,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            is_error = reply.is_error(),
            "Request handled"
        );
        reply
    }

    /// Handles one notification. Never produces output.
    pub fn handle_notification(&self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" => info!("Client completed initialisation"),
            "notifications/cancelled" => {
                let params = notif.params.as_ref();
                let request_id = params
                    .and_then(|p| p.get("requestId"))
                    .and_then(RequestId::from_value);
                let reason = params
                    .and_then(|p| p.get("reason"))
                    .and_then(Value::as_str)
                    .unwrap_or("unspecified");
                match request_id {
                    Some(id) => info!(
                        request_id = %id,
                        reason,
                        "Client cancelled request; running handlers are not interrupted"
                    ),
                    None => warn!("Cancellation notification without a usable requestId"),
                }
            }
            other => debug!(method = other, "Ignoring notification"),
        }
    }

    fn handle_initialize(&self, req: &JsonRpcRequest) -> Value {
        match req.params.clone().map(serde_json::from_value::<InitializeParams>) {
            Some(Ok(params)) => {
                let client = params.client_info.as_ref();
                info!(
                    client = client.map_or("unknown", |c| c.name.as_str()),
                    client_version = client.and_then(|c| c.version.as_deref()).unwrap_or("-"),
                    requested_version = params.protocol_version.as_deref().unwrap_or("-"),
                    "Client initialising"
                );
            }
            Some(Err(e)) => debug!(error = %e, "Ignoring malformed initialize params"),
            None => debug!("Initialize without params"),
        }

        let mut result = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": self.server_info,
        });
        if let Some(instructions) = &self.instructions {
            result["instructions"] = Value::String(instructions.clone());
        }
        result
    }

    fn handle_tools_list(&self) -> Value {
        let tools: Vec<_> = self.tools.definitions().collect();
        json!({ "tools": tools })
    }

    fn handle_resources_list(&self) -> Value {
        let resources: Vec<_> = self.resources.definitions().collect();
        json!({ "resources": resources })
    }

    async fn handle_tools_call(&self, req: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let id = &req.id;
        let params = object_params(req)
            .ok_or_else(|| JsonRpcError::invalid_params(id.clone(), "Missing tool call params"))?;

        let name = params.get("name").and_then(Value::as_str).ok_or_else(|| {
            JsonRpcError::invalid_params(id.clone(), "Missing required parameter: name")
        })?;

        let (definition, handler) = self.tools.get(name).ok_or_else(|| {
            JsonRpcError::new(
                Some(id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::MethodNotFound,
                    format!("Unknown tool: {name}"),
                ),
            )
        })?;

        let arguments = params.get("arguments").filter(|a| !a.is_null()).cloned();
        let empty = Value::Object(Map::new());
        schema::validate(&definition.input_schema, arguments.as_ref().unwrap_or(&empty))
            .map_err(|message| {
                JsonRpcError::invalid_params(
                    id.clone(),
                    format!("Invalid arguments for tool '{name}': {message}"),
                )
            })?;

        info!(tool = name, "Calling tool");
        let started = Instant::now();
        let outcome = run_isolated(async move { handler.call(arguments).await }).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(Ok(result)) => {
                debug!(tool = name, elapsed_ms, is_error = result.is_error, "Tool finished");
                serde_json::to_value(&result).map_err(|e| {
                    error!(error = %e, "Failed to serialise tool call result");
                    JsonRpcError::internal_error(
                        id.clone(),
                        "Internal error: failed to serialise result",
                    )
                })
            }
            Ok(Err(e)) => {
                warn!(tool = name, elapsed_ms, error = %e, "Tool failed");
                Err(JsonRpcError::internal_error(id.clone(), e.to_string()))
            }
            Err(message) => {
                error!(tool = name, elapsed_ms, "Tool handler aborted: {message}");
                Err(JsonRpcError::internal_error(
                    id.clone(),
                    format!("Tool '{name}' {message}"),
                ))
            }
        }
    }

    async fn handle_resources_read(&self, req: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let id = &req.id;
        let uri = object_params(req)
            .and_then(|p| p.get("uri"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                JsonRpcError::invalid_params(id.clone(), "Missing required parameter: uri")
            })?;

        let (definition, handler) = self.resources.get(uri).ok_or_else(|| {
            JsonRpcError::new(
                Some(id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::MethodNotFound,
                    format!("Unknown resource: {uri}"),
                ),
            )
        })?;
        let mime_type = definition
            .mime_type
            .clone()
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        match run_isolated(async move { handler.read().await }).await {
            Ok(Ok(text)) => Ok(json!({
                "contents": [{
                    "uri": uri,
                    "mimeType": mime_type,
                    "text": text,
                }]
            })),
            Ok(Err(e)) => {
                warn!(uri, error = %e, "Resource read failed");
                Err(JsonRpcError::internal_error(id.clone(), e.to_string()))
            }
            Err(message) => {
                error!(uri, "Resource handler aborted: {message}");
                Err(JsonRpcError::internal_error(
                    id.clone(),
                    format!("Resource '{uri}' {message}"),
                ))
            }
        }
    }
}

fn object_params(req: &JsonRpcRequest) -> Option<&Map<String, Value>> {
    req.params.as_ref().and_then(Value::as_object)
}

/// Runs handler code on its own task so a panic cannot unwind into the
/// dispatcher. The outer error describes how the task ended.
async fn run_isolated<F, T>(future: F) -> Result<ToolResult<T>, &'static str>
where
    F: Future<Output = ToolResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(future).await.map_err(|e| {
        if e.is_panic() {
            "panicked"
        } else {
            "was cancelled"
        }
    })
}
