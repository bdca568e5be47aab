//! Model Context Protocol (MCP) server implementation.
//!
//! This module implements the MCP specification for exposing Xcode build and
//! run operations as tools to AI assistants. The server communicates over
//! stdio transport using JSON-RPC 2.0 messages.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         MCP Server                          │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    │
//! │   │  Transport  │───▶│ Dispatcher  │───▶│  Registry   │    │
//! │   │   (stdio)   │    │  (methods)  │    │ (handlers)  │    │
//! │   └─────────────┘    └─────────────┘    └─────────────┘    │
//! │          │                  │                  │            │
//! │          ▼                  ▼                  ▼            │
//! │   ┌─────────────────────────────────────────────────┐      │
//! │   │              JSON-RPC Messages                  │      │
//! │   └─────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod dispatcher;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod server;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use registry::{
    ResourceDefinition, ResourceRegistry, ToolCallResult, ToolDefinition, ToolRegistry,
};
pub use server::{McpServer, ServerHandle, ServerState};
pub use transport::LineTransport;
