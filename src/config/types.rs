use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use mediabridge_common::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Engine per format key.
    #[serde(default = "default_formats")]
    pub formats: BTreeMap<String, EngineConfig>,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
            workspace: WorkspaceConfig::default(),
            proxy: ProxyConfig::default(),
        }
    }
}

fn default_formats() -> BTreeMap<String, EngineConfig> {
    ["webm", "mp4"]
        .into_iter()
        .map(|format| (format.to_string(), EngineConfig::default()))
        .collect()
}

impl BridgeConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("invalid config JSON: {e}")))
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::config(format!("invalid config TOML: {e}")))
    }

    /// Check the configuration for problems that do not prevent use.
    ///
    /// Returns one human-readable warning per problem. Hard errors are
    /// raised when the format registry is built.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.formats.is_empty() {
            warnings.push("no formats configured; every request will be rejected".to_string());
        }

        for (key, engine) in &self.formats {
            if engine.locator.as_os_str().is_empty() {
                warnings.push(format!("format '{key}' has an empty engine locator"));
            }
        }

        if let Some(root) = &self.workspace.root {
            if !root.is_dir() {
                warnings.push(format!(
                    "workspace root {} does not exist; runs will fail to stage",
                    root.display()
                ));
            }
        }

        if self.proxy.max_in_flight == 0 {
            warnings.push("proxy.max_in_flight is 0; every bridge request will be rejected".to_string());
        }

        if !self.proxy.origin.is_empty() && url::Url::parse(&self.proxy.origin).is_err() {
            warnings.push(format!(
                "proxy.origin '{}' is not a URL; it will be compared verbatim",
                self.proxy.origin
            ));
        }

        if self.proxy.formats.is_empty() {
            warnings.push("proxy.formats is empty; the bridge will reject every request".to_string());
        }

        warnings
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Engine program: a path, or a bare name looked up in `PATH`.
    #[serde(default = "default_locator")]
    pub locator: PathBuf,

    /// Arguments prepended to every run.
    #[serde(default)]
    pub args_prefix: Vec<String>,
}

fn default_locator() -> PathBuf {
    PathBuf::from("ffmpeg")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            locator: default_locator(),
            args_prefix: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkspaceConfig {
    /// Directory scratch workspaces are created under (system temp dir if unset).
    #[serde(default)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Origin the remote host is expected to post from.
    #[serde(default)]
    pub origin: String,

    /// Formats the remote host serves.
    #[serde(default = "default_proxy_formats")]
    pub formats: Vec<String>,

    /// Maximum number of bridge requests awaiting a response.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_proxy_formats() -> Vec<String> {
    vec!["webm".to_string(), "mp4".to_string()]
}

fn default_max_in_flight() -> usize {
    64
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            origin: String::new(),
            formats: default_proxy_formats(),
            max_in_flight: default_max_in_flight(),
        }
    }
}
