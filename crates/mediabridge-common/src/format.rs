//! Format keys and extension helpers.
//!
//! A [`FormatKey`] selects which execution unit handles a request. Keys are
//! normalized to lowercase without a leading dot, so `".WebM"` and `"webm"`
//! address the same unit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Identifier of a media container/type, usually a file extension.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FormatKey(String);

impl FormatKey {
    /// Create a normalized format key.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let key = raw.as_ref().trim().trim_start_matches('.').to_lowercase();
        Self(key)
    }

    /// Derive a format key from the extension of a file name.
    ///
    /// Returns `None` if the name has no extension.
    ///
    /// # Examples
    ///
    /// ```
    /// use mediabridge_common::FormatKey;
    ///
    /// assert_eq!(FormatKey::from_name("clip.WEBM"), Some(FormatKey::new("webm")));
    /// assert_eq!(FormatKey::from_name("README"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        extension_of(name).map(Self::new)
    }

    /// The normalized key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key is empty after normalization.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FormatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for FormatKey {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for FormatKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<FormatKey> for String {
    fn from(key: FormatKey) -> Self {
        key.0
    }
}

/// Return the extension of a file name, without the dot.
pub fn extension_of(name: &str) -> Option<&str> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
}
