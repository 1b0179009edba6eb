mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

use crate::registry::FormatRegistry;

/// Load configuration from a TOML file (or JSON, by `.json` extension)
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config: BridgeConfig = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?
    } else {
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))?
    };

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<BridgeConfig> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./mediabridge.toml",
        "~/.config/mediabridge/config.toml",
        "/etc/mediabridge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(BridgeConfig::default())
}

/// Reject configurations the registry cannot be built from; log the rest.
fn validate_config(config: &BridgeConfig) -> Result<()> {
    FormatRegistry::from_config(config).context("Invalid format table")?;

    for warning in config.validate() {
        tracing::warn!("{warning}");
    }

    Ok(())
}
