//! Persisted project, scheme, configuration and destination selection.
//!
//! The selection survives restarts in a small JSON file. Writes go to a
//! sibling temporary file first and are then renamed into place, so a crash
//! never leaves a half-written state behind.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ToolError, ToolResult};
use crate::xcode::destination::Destination;

/// The current selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    /// Selected workspace, project or package manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<PathBuf>,
    /// Selected scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// Selected build configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,
    /// Selected destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Destination>,
    /// When the selection last changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A partial change to the selection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionUpdate {
    /// New project path.
    #[serde(default)]
    pub project: Option<PathBuf>,
    /// New scheme.
    #[serde(default)]
    pub scheme: Option<String>,
    /// New build configuration.
    #[serde(default)]
    pub configuration: Option<String>,
    /// New destination.
    #[serde(default)]
    pub destination: Option<Destination>,
    /// Clear everything before applying the other fields.
    #[serde(default)]
    pub reset: bool,
}

impl SelectionUpdate {
    /// Returns `true` if the update would change nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.reset
            && self.project.is_none()
            && self.scheme.is_none()
            && self.configuration.is_none()
            && self.destination.is_none()
    }
}

impl SelectionState {
    /// Applies `update` and stamps the change time.
    ///
    /// Choosing a different project forgets the scheme, since schemes belong
    /// to a project, unless the update names a scheme too.
    pub fn apply(&mut self, update: SelectionUpdate, now: DateTime<Utc>) {
        if update.reset {
            *self = Self::default();
        }

        if let Some(project) = update.project {
            if self.project.as_ref() != Some(&project) && update.scheme.is_none() {
                self.scheme = None;
            }
            self.project = Some(project);
        }
        if let Some(scheme) = update.scheme {
            self.scheme = Some(scheme);
        }
        if let Some(configuration) = update.configuration {
            self.configuration = Some(configuration);
        }
        if let Some(destination) = update.destination {
            self.destination = Some(destination);
        }

        self.updated_at = Some(now);
    }
}

/// Loads and saves [`SelectionState`] at a fixed path.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the state file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the state. A missing file is an empty selection.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub async fn load(&self) -> ToolResult<SelectionState> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_json::from_str(&text).map_err(|e| self.error(e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No saved selection, starting empty");
                Ok(SelectionState::default())
            }
            Err(e) => Err(self.error(e)),
        }
    }

    /// Writes the state, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, state: &SelectionState) -> ToolResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error(e))?;
        }

        let json = serde_json::to_string_pretty(state)?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, json)
            .await
            .map_err(|e| self.error(e))?;
        if let Err(e) = tokio::fs::rename(&staging, &self.path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&staging).await {
                warn!(path = %staging.display(), error = %cleanup, "Failed to remove staging file");
            }
            return Err(self.error(e));
        }

        debug!(path = %self.path.display(), "Saved selection");
        Ok(())
    }

    /// Loads, applies `update`, saves, and returns the new state.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or saving fails.
    pub async fn update(&self, update: SelectionUpdate) -> ToolResult<SelectionState> {
        let mut state = self.load().await?;
        state.apply(update, Utc::now());
        self.save(&state).await?;
        Ok(state)
    }

    fn error(&self, e: impl std::fmt::Display) -> ToolError {
        ToolError::State {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xcode::destination::DestinationKind;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn changing_project_clears_scheme() {
        let mut state = SelectionState {
            project: Some(PathBuf::from("/a/A.xcodeproj")),
            scheme: Some("A".to_string()),
            ..SelectionState::default()
        };

        state.apply(
            SelectionUpdate {
                project: Some(PathBuf::from("/b/B.xcodeproj")),
                ..SelectionUpdate::default()
            },
            at(10),
        );
        assert_eq!(state.scheme, None);
        assert_eq!(state.updated_at, Some(at(10)));

        state.apply(
            SelectionUpdate {
                project: Some(PathBuf::from("/c/C.xcodeproj")),
                scheme: Some("C".to_string()),
                ..SelectionUpdate::default()
            },
            at(20),
        );
        assert_eq!(state.scheme.as_deref(), Some("C"));
    }

    #[test]
    fn reselecting_same_project_keeps_scheme() {
        let mut state = SelectionState {
            project: Some(PathBuf::from("/a/A.xcodeproj")),
            scheme: Some("A".to_string()),
            ..SelectionState::default()
        };
        state.apply(
            SelectionUpdate {
                project: Some(PathBuf::from("/a/A.xcodeproj")),
                ..SelectionUpdate::default()
            },
            at(1),
        );
        assert_eq!(state.scheme.as_deref(), Some("A"));
    }

    #[test]
    fn reset_clears_before_applying() {
        let mut state = SelectionState {
            scheme: Some("A".to_string()),
            configuration: Some("Release".to_string()),
            ..SelectionState::default()
        };
        state.apply(
            SelectionUpdate {
                reset: true,
                configuration: Some("Debug".to_string()),
                ..SelectionUpdate::default()
            },
            at(1),
        );
        assert_eq!(state.scheme, None);
        assert_eq!(state.configuration.as_deref(), Some("Debug"));
    }

    #[test]
    fn update_rejects_unknown_fields() {
        let result: Result<SelectionUpdate, _> =
            serde_json::from_value(serde_json::json!({"schema": "typo"}));
        assert!(result.is_err());
        assert!(SelectionUpdate::default().is_empty());
    }

    #[tokio::test]
    async fn missing_file_loads_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert_eq!(store.load().await.unwrap(), SelectionState::default());
    }

    #[tokio::test]
    async fn update_persists_across_stores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let store = StateStore::new(&path);

        let saved = store
            .update(SelectionUpdate {
                scheme: Some("Weather".to_string()),
                destination: Some(Destination {
                    kind: DestinationKind::Simulator,
                    id: "ABC".to_string(),
                    name: "iPhone 15".to_string(),
                    os: Some("iOS 17.2".to_string()),
                    state: None,
                }),
                ..SelectionUpdate::default()
            })
            .await
            .unwrap();
        assert!(saved.updated_at.is_some());
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = StateStore::new(&path).load().await.unwrap();
        assert_eq!(reloaded, saved);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_state_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = StateStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, ToolError::State { .. }));
        assert!(err.to_string().contains("state.json"));
    }
}
