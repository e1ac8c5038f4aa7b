//! Theme Overlay
//!
//! Parallel mode groups (`theme.light`, `theme.dark`, ...) exposed under a
//! short alias (`theme.fg`). The selector leaf (`theme.mode`) decides which
//! group the alias reads from; switching modes is a single write and moves
//! no data.
//!
//! # Rules
//!
//! - A path is an alias when its first segment is the namespace and its
//!   second segment is neither a mode nor the selector. `theme.a.b` is an
//!   alias for `theme.<mode>.a.b`.
//! - Reading an alias records the selector *and* the resolved path as
//!   dependencies, so a binding re-runs on a mode switch as well as on an
//!   edit of the value it is showing. The key under the other modes is
//!   watched for presence only: removing it re-runs the binding, editing it
//!   does not.
//! - Theme keys are symmetric. If the key is present under some modes and
//!   absent under others, the read fails with `ThemeKeyAsymmetry` no matter
//!   which mode is active.
//! - Writing an alias is always rejected; the caller has to pick a mode.

use serde_json::Value;

use crate::config::ThemeConfig;
use crate::error::{Result, StoreError};
use crate::store::Store;
use crate::tree::{Children, Lookup, Node, Path, PathTree, SEPARATOR};

/// Resolves theme aliases against the active mode.
#[derive(Debug, Clone)]
pub struct ThemeResolver {
    config: ThemeConfig,
    selector: Path,
    overlay: Node,
}

impl Default for ThemeResolver {
    /// The `theme` / `mode` / `light` + `dark` layout.
    fn default() -> Self {
        Self::from_validated(ThemeConfig::default())
    }
}

impl ThemeResolver {
    /// Validate a theme layout.
    pub fn new(config: ThemeConfig) -> Result<Self> {
        validate(&config)?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: ThemeConfig) -> Self {
        let selector = Path::from_trusted(format!(
            "{}{SEPARATOR}{}",
            config.namespace, config.selector
        ));
        let mut overlay = Children::new();
        overlay.insert(
            config.selector.clone(),
            Node::Leaf(Value::String(config.default_mode.clone())),
        );
        for mode in &config.modes {
            overlay.insert(mode.clone(), Node::group());
        }
        Self {
            config,
            selector,
            overlay: Node::Group(overlay),
        }
    }

    /// The layout this resolver was built from.
    pub fn config(&self) -> &ThemeConfig {
        &self.config
    }

    /// Path of the selector leaf, e.g. `theme.mode`.
    pub fn selector_path(&self) -> &Path {
        &self.selector
    }

    /// The key an alias stands for (`fg` for `theme.fg`), or `None` when
    /// `path` is not an alias.
    pub fn alias_key<'a>(&self, path: &'a str) -> Option<&'a str> {
        let key = path
            .strip_prefix(self.config.namespace.as_str())?
            .strip_prefix(SEPARATOR)?;
        let second = key.split(SEPARATOR).next().unwrap_or(key);
        if second == self.config.selector || self.config.modes.iter().any(|mode| mode == second) {
            return None;
        }
        Some(key)
    }

    /// Mode-qualified path of `key`, e.g. `theme.dark.fg`.
    pub fn qualify(&self, mode: &str, key: &str) -> Result<Path> {
        Path::parse(&format!(
            "{}{SEPARATOR}{mode}{SEPARATOR}{key}",
            self.config.namespace
        ))
    }

    /// Reject a write to an alias.
    pub fn check_write(&self, path: &str) -> Result<()> {
        let Some(key) = self.alias_key(path) else {
            return Ok(());
        };
        let qualified = self
            .config
            .modes
            .iter()
            .map(|mode| format!("{}{SEPARATOR}{mode}{SEPARATOR}{key}", self.config.namespace))
            .collect();
        Err(StoreError::AmbiguousThemeWrite {
            path: path.to_string(),
            qualified,
        })
    }

    /// Interpret what was read at the selector path.
    pub fn mode_from(&self, selector: &Lookup) -> Result<&str> {
        match selector {
            Lookup::Missing(_) | Lookup::Value(Value::Null) => Ok(&self.config.default_mode),
            Lookup::Value(Value::String(name)) => self
                .config
                .modes
                .iter()
                .find(|mode| *mode == name)
                .map(String::as_str)
                .ok_or_else(|| StoreError::UnknownThemeMode {
                    mode: format!("'{name}'"),
                }),
            Lookup::Value(other) => Err(StoreError::UnknownThemeMode {
                mode: other.to_string(),
            }),
            Lookup::Group(_) => Err(StoreError::UnknownThemeMode {
                mode: "(a group)".to_string(),
            }),
        }
    }

    /// Tracked read of the alias `key` through `store`.
    pub(crate) fn read(&self, store: &Store, key: &str) -> Result<Lookup> {
        let selector = store.read_tracked(&self.selector);
        let active = self.mode_from(&selector)?;

        let mut absent = None;
        let mut present = false;
        for mode in &self.config.modes {
            let qualified = self.qualify(mode, key)?;
            let exists = store.contains_path(&qualified);
            if mode != active {
                // Other modes are watched for the key appearing or vanishing, not for edits.
                if exists {
                    store.tracker().record_presence(&qualified);
                } else {
                    store.tracker().record_read(&qualified);
                }
            }
            if exists {
                present = true;
            } else if absent.is_none() {
                absent = Some(qualified);
            }
        }
        if let (true, Some(missing_in)) = (present, absent) {
            return Err(StoreError::ThemeKeyAsymmetry {
                key: key.to_string(),
                missing_in: missing_in.to_string(),
            });
        }

        Ok(store.read_tracked(&self.qualify(active, key)?))
    }

    /// Put the selector and an empty group per mode into a fresh tree.
    pub fn seed(&self, tree: &mut PathTree) {
        tree.graft(&self.config.namespace, self.overlay.clone());
    }
}

fn validate(config: &ThemeConfig) -> Result<()> {
    let segments = std::iter::once(("namespace", &config.namespace))
        .chain(std::iter::once(("selector", &config.selector)))
        .chain(config.modes.iter().map(|mode| ("mode", mode)));
    for (what, segment) in segments {
        if segment.is_empty() || segment.contains(SEPARATOR) {
            return Err(invalid(format!("{what} '{segment}' must be a single path segment")));
        }
    }
    if config.modes.is_empty() {
        return Err(invalid("at least one mode is required".to_string()));
    }
    if let Some((i, dup)) = config
        .modes
        .iter()
        .enumerate()
        .find(|(i, mode)| config.modes[..*i].contains(mode))
    {
        return Err(invalid(format!("mode '{dup}' is listed twice (position {i})")));
    }
    if config.modes.contains(&config.selector) {
        return Err(invalid(format!(
            "selector '{}' collides with a mode name",
            config.selector
        )));
    }
    if !config.modes.contains(&config.default_mode) {
        return Err(invalid(format!(
            "default mode '{}' is not one of the modes",
            config.default_mode
        )));
    }
    Ok(())
}

fn invalid(reason: String) -> StoreError {
    StoreError::InvalidThemeConfig { reason }
}
