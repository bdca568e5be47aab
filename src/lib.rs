//! xcode-tools-mcp: MCP server for AI-assisted Xcode builds
//!
//! This library exposes Xcode project discovery, scheme and destination
//! selection, builds and app launches as MCP tools that an AI assistant can
//! call over stdio.
//!
//! # Architecture
//!
//! The MCP core knows nothing about Xcode. It routes JSON-RPC requests to
//! handlers registered by name:
//!
//! - **Protocol core**: framing, envelopes, dispatch, lifecycle ([`mcp`])
//! - **Tools**: handler structs and their schemas ([`tools`])
//! - **Xcode tooling**: `xcodebuild`/`xcrun` invocation and output parsing ([`xcode`])
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol implementation
//! - [`tools`]: MCP tool and resource handlers
//! - [`xcode`]: Xcode command-line tooling

pub mod config;
pub mod error;
pub mod mcp;
pub mod tools;
pub mod xcode;
