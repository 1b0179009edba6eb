//! Logging setup for embedders.

use mediabridge_common::{Error, Result};

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` is respected if set; otherwise the filter depends on `verbose`.
/// Fails if a global subscriber is already installed.
pub fn init(verbose: bool) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .try_init()
        .map_err(|e| Error::config(format!("failed to install tracing subscriber: {e}")))
}

fn env_filter(verbose: bool) -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter(verbose).to_string())
}

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "mediabridge=trace,mediabridge_engine=trace,mediabridge_common=debug"
    } else {
        "mediabridge=info,mediabridge_engine=info"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filters() {
        assert!(default_filter(true).contains("mediabridge=trace"));
        assert!(default_filter(false).contains("mediabridge=info"));
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init(false);
        assert!(init(false).is_err());
    }
}
