//! Error taxonomy for the store.
//!
//! Every failure here is local to the call that raised it. Nothing in the
//! crate catches or suppresses these errors: a failing listener surfaces at
//! the `set` that triggered it, a failing theme read surfaces at the `get`
//! (or at the tracked computation that performed it).

use thiserror::Error;

/// Errors raised by the store and its reactive layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The dot path was empty or contained an empty segment.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The offending input.
        path: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// A missing result (or a group view) was used where a value is required.
    #[error("settings key '{path}' does not exist as a value ({found})")]
    MissingAccess {
        /// Path of the read that produced the unusable result.
        path: String,
        /// What the path actually resolved to.
        found: &'static str,
    },

    /// A write targeted an unqualified theme alias.
    #[error(
        "cannot set '{path}' directly; write to one of the mode-qualified paths instead: {}",
        .qualified.join(", ")
    )]
    AmbiguousThemeWrite {
        /// The alias that was written.
        path: String,
        /// The qualified paths the caller should use instead.
        qualified: Vec<String>,
    },

    /// A theme key exists under some modes but not others.
    #[error("theme key '{key}' is not defined in '{missing_in}'")]
    ThemeKeyAsymmetry {
        /// Key relative to the mode group, e.g. `fg`.
        key: String,
        /// Qualified path that is absent, e.g. `theme.dark.fg`.
        missing_in: String,
    },

    /// The theme selector names a mode that is not configured.
    #[error("theme mode {mode} is not one of the configured modes")]
    UnknownThemeMode {
        /// The selector value as found in the tree.
        mode: String,
    },

    /// The theme layout in the store configuration is unusable.
    #[error("invalid theme configuration: {reason}")]
    InvalidThemeConfig {
        /// What was wrong with it.
        reason: String,
    },

    /// A write could not be applied without changing a node's tag in a way
    /// the store does not do implicitly.
    #[error("cannot write '{path}': '{conflict_at}' {reason}")]
    StructuralConflict {
        /// The path that was written.
        path: String,
        /// The node that blocked the write.
        conflict_at: String,
        /// Human readable description.
        reason: &'static str,
    },

    /// A stored value could not be converted into the requested type.
    #[error("failed to decode value: {0}")]
    Decode(#[from] serde_json::Error),

    /// A snapshot could not be encoded as MessagePack.
    #[error("failed to encode snapshot: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    /// A MessagePack snapshot could not be decoded.
    #[error("failed to decode snapshot: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    /// A snapshot decoded fine but was not a mapping at the top level.
    #[error("snapshot root must be a mapping, found {found}")]
    NotAMapping {
        /// JSON type name of what was found instead.
        found: &'static str,
    },

    /// A user-supplied listener or computation failed.
    #[error("listener failed: {0}")]
    Listener(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wrap an arbitrary error raised inside a listener or tracked computation.
    pub fn listener<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        StoreError::Listener(err.into())
    }

    /// True for the error raised when a missing result is used as a value.
    pub fn is_missing_access(&self) -> bool {
        matches!(self, StoreError::MissingAccess { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
