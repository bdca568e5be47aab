//! Xcode tooling behind the MCP tools.
//!
//! Everything here shells out to `xcodebuild`, `xcrun` and `open` through
//! [`shell::CommandRunner`] and interprets their output. Xcode project files
//! are never parsed directly.
//!
//! # Modules
//!
//! - [`project`]: workspace, project and Swift package discovery
//! - [`scheme`]: scheme listing
//! - [`destination`]: simulators, devices and the host Mac
//! - [`state`]: persisted selection
//! - [`build`]: `xcodebuild` requests and reports
//! - [`launch`]: install and launch after a successful build
//! - [`shell`]: quoting, timeouts and bounded output capture

pub mod build;
pub mod destination;
pub mod launch;
pub mod project;
pub mod scheme;
pub mod shell;
pub mod state;

pub use build::{BuildAction, BuildOptions, BuildReport, BuildRequest};
pub use destination::{Destination, DestinationKind};
pub use launch::{AppBundle, RunReport};
pub use project::{ProjectEntry, ProjectKind};
pub use scheme::SchemeList;
pub use shell::{CommandRunner, Script};
pub use state::{SelectionState, SelectionUpdate, StateStore};
