//! Validated table of format keys and the engines that serve them.

use std::collections::BTreeMap;

use mediabridge_common::{Error, FormatKey, Result};
use mediabridge_engine::EngineLocator;

use crate::config::BridgeConfig;

/// Immutable mapping from [`FormatKey`] to [`EngineLocator`].
///
/// Built once and validated on construction: keys are non-empty and unique
/// after normalization, and every locator names a program.
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    engines: BTreeMap<FormatKey, EngineLocator>,
}

impl FormatRegistry {
    /// Build a registry from `(key, locator)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty key, an empty locator, or two
    /// raw keys that normalize to the same [`FormatKey`].
    pub fn from_entries<K, I>(entries: I) -> Result<Self>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, EngineLocator)>,
    {
        let mut engines = BTreeMap::new();

        for (raw, locator) in entries {
            let raw = raw.as_ref();
            let key = FormatKey::new(raw);
            if key.is_empty() {
                return Err(Error::config(format!("empty format key {raw:?}")));
            }
            if locator.program.as_os_str().is_empty() {
                return Err(Error::config(format!("format '{key}' has an empty engine locator")));
            }
            if engines.insert(key.clone(), locator).is_some() {
                return Err(Error::config(format!("duplicate format key '{key}'")));
            }
        }

        Ok(Self { engines })
    }

    /// Build a registry from the `formats` table of a configuration.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        Self::from_entries(config.formats.iter().map(|(key, engine)| {
            let locator = EngineLocator {
                program: engine.locator.clone(),
                args_prefix: engine.args_prefix.clone(),
            };
            (key.as_str(), locator)
        }))
    }

    /// Locator for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] if `key` is not registered.
    pub fn locator(&self, key: &FormatKey) -> Result<&EngineLocator> {
        self.engines
            .get(key)
            .ok_or_else(|| Error::unsupported_format(key.as_str()))
    }

    pub fn contains(&self, key: &FormatKey) -> bool {
        self.engines.contains_key(key)
    }

    /// Registered keys in sorted order.
    pub fn formats(&self) -> impl Iterator<Item = &FormatKey> {
        self.engines.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FormatKey, &EngineLocator)> {
        self.engines.iter()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
