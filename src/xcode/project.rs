//! Discovery of Xcode workspaces, projects and Swift packages.
//!
//! Discovery only looks at file names; project contents are never parsed.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use glob::MatchOptions;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DiscoveryConfig;
use crate::error::{ToolError, ToolResult};

/// Kind of buildable container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectKind {
    /// An `.xcworkspace` bundle.
    Workspace,
    /// An `.xcodeproj` bundle.
    Project,
    /// A directory with a `Package.swift` manifest.
    SwiftPackage,
}

impl ProjectKind {
    /// Classifies a path by its file name.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name == "Package.swift" {
            Some(Self::SwiftPackage)
        } else if has_extension(path, "xcworkspace") {
            Some(Self::Workspace)
        } else if has_extension(path, "xcodeproj") {
            Some(Self::Project)
        } else {
            None
        }
    }

    /// Returns the `xcodebuild` flag that selects this container.
    ///
    /// Swift packages have none; `xcodebuild` picks them up from the working
    /// directory.
    #[must_use]
    pub const fn xcodebuild_flag(self) -> Option<&'static str> {
        match self {
            Self::Workspace => Some("-workspace"),
            Self::Project => Some("-project"),
            Self::SwiftPackage => None,
        }
    }

    const fn pattern(self) -> &'static str {
        match self {
            Self::Workspace => "*.xcworkspace",
            Self::Project => "*.xcodeproj",
            Self::SwiftPackage => "Package.swift",
        }
    }
}

/// A discovered workspace, project or package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEntry {
    /// Display name (bundle stem or package directory name).
    pub name: String,
    /// Path of the bundle or manifest.
    pub path: PathBuf,
    /// Container kind.
    pub kind: ProjectKind,
}

impl ProjectEntry {
    /// Builds an entry from a path, classifying it by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist or is not a workspace,
    /// project or `Package.swift` (a directory containing one is accepted).
    pub fn from_path(path: &Path) -> ToolResult<Self> {
        if !path.exists() {
            return Err(ToolError::NotFound(format!("project {}", path.display())));
        }

        let manifest = path.join("Package.swift");
        let path = if ProjectKind::from_path(path).is_none() && manifest.is_file() {
            manifest
        } else {
            path.to_path_buf()
        };

        let kind = ProjectKind::from_path(&path).ok_or_else(|| {
            ToolError::InvalidArguments(format!(
                "{} is not an .xcworkspace, .xcodeproj or Swift package",
                path.display()
            ))
        })?;

        let named = match kind {
            ProjectKind::SwiftPackage => path.parent().and_then(Path::file_name),
            ProjectKind::Workspace | ProjectKind::Project => path.file_stem(),
        };
        let name = named.map_or_else(
            || path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        );

        Ok(Self { name, path, kind })
    }

    /// Returns the directory `xcodebuild` should run from.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e == ext)
}

/// Finds every workspace, project and package below `roots`.
///
/// Results are sorted by path and free of duplicates even when roots
/// overlap. Unreadable roots are skipped with a warning.
#[must_use]
pub fn discover(roots: &[PathBuf], discovery: &DiscoveryConfig) -> Vec<ProjectEntry> {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let mut found = BTreeMap::new();

    for root in roots {
        let root = match root.canonicalize() {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %root.display(), error = %e, "Skipping unreadable search path");
                continue;
            }
        };
        let escaped = glob::Pattern::escape(&root.to_string_lossy());

        for depth in 0..discovery.max_depth {
            for kind in [ProjectKind::Workspace, ProjectKind::Project, ProjectKind::SwiftPackage] {
                let pattern = format!("{escaped}/{}{}", "*/".repeat(depth), kind.pattern());
                let paths = match glob::glob_with(&pattern, options) {
                    Ok(paths) => paths,
                    Err(e) => {
                        warn!(pattern = %pattern, error = %e, "Invalid discovery pattern");
                        continue;
                    }
                };

                for path in paths.filter_map(Result::ok) {
                    if is_excluded(&root, &path, &discovery.ignore) {
                        continue;
                    }
                    if let Ok(entry) = ProjectEntry::from_path(&path) {
                        found.entry(entry.path.clone()).or_insert(entry);
                    }
                }
            }
        }
    }

    debug!(count = found.len(), "Project discovery finished");
    found.into_values().collect()
}

/// Returns `true` if `path` sits inside an ignored directory or inside
/// another bundle (such as the workspace embedded in every `.xcodeproj`).
fn is_excluded(root: &Path, path: &Path, ignore: &[String]) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return true;
    };
    let Some(parent) = relative.parent() else {
        return false;
    };

    parent.components().any(|component| match component {
        Component::Normal(name) => {
            let dir = Path::new(name);
            ignore.iter().any(|i| name == i.as_str())
                || ProjectKind::from_path(dir).is_some()
                || dir
                    .extension()
                    .is_some_and(|e| e == "app" || e == "xcarchive")
        }
        _ => false,
    })
}
