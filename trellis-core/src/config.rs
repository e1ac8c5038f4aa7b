//! Store Configuration
//!
//! Knobs that change store behavior rather than store contents. The whole
//! structure is serde-friendly so a host can keep it next to its settings
//! file; every field has a default, so `{}` is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How a change notification is matched against a binding's recorded reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyMatch {
    /// Re-run when the changed path was read, or when the write replaced an
    /// ancestor of a path that was read (subtree assignment).
    #[default]
    Exact,

    /// Everything `Exact` matches, plus changes below a path that was read.
    /// A computation that read a whole group re-runs when any leaf inside
    /// it changes.
    Prefix,
}

/// Layout of the theme overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    /// Reserved top-level segment, e.g. `theme`.
    pub namespace: String,
    /// Segment under the namespace holding the active mode name.
    pub selector: String,
    /// Names of the parallel mode groups.
    pub modes: Vec<String>,
    /// Mode used when the selector is missing or null.
    pub default_mode: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            namespace: "theme".to_string(),
            selector: "mode".to_string(),
            modes: vec!["light".to_string(), "dark".to_string()],
            default_mode: "light".to_string(),
        }
    }
}

/// Construction-time configuration for a [`Store`](crate::Store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Theme overlay layout. `None` turns the overlay off entirely.
    pub theme: Option<ThemeConfig>,

    /// Replace a leaf with an empty group when a write needs to pass through
    /// it. When false such writes fail with `StructuralConflict`.
    pub promote_leaves: bool,

    /// Matching granularity for reactive re-runs.
    pub dependency_match: DependencyMatch,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            theme: Some(ThemeConfig::default()),
            promote_leaves: true,
            dependency_match: DependencyMatch::Exact,
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// A configuration with the theme overlay disabled.
    pub fn without_theme() -> Self {
        Self {
            theme: None,
            ..Self::default()
        }
    }
}
