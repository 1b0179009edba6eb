//! Argument vectors for the high-level operations.

use serde::{Deserialize, Serialize};

use mediabridge_common::format::extension_of;
use mediabridge_common::{Error, Result};

/// Overrides for [`decode`](super::Converter::decode).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Output container; defaults to the target name's extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Audio codec; defaults to `copy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
}

/// Target of a transform: output name plus optional codec, window, and
/// extra arguments.
///
/// Window fields are seconds. Any two of `start`, `end`, `duration` determine
/// the third; `end` alone clips from the beginning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    /// Output container passed as `-f`; when unset the engine infers it
    /// from the name's extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Extra arguments placed right before the output name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
}

impl TargetSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    pub fn with_start(mut self, seconds: f64) -> Self {
        self.start = Some(seconds);
        self
    }

    pub fn with_end(mut self, seconds: f64) -> Self {
        self.end = Some(seconds);
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_modifiers(mut self, modifiers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.modifiers.extend(modifiers.into_iter().map(Into::into));
        self
    }

    /// Output container: the explicit format, else the name's extension.
    pub fn target_format(&self) -> String {
        self.format
            .clone()
            .or_else(|| extension_of(&self.name).map(str::to_lowercase))
            .unwrap_or_default()
    }

    /// Audio codec: the explicit codec, else the default for the container.
    pub fn target_codec(&self) -> String {
        self.codec
            .clone()
            .unwrap_or_else(|| default_codec(&self.target_format()).to_string())
    }

    /// Resolve the window into `(seek, length)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for negative or non-finite values and
    /// for windows that end before they start.
    pub fn window(&self) -> Result<(Option<f64>, Option<f64>)> {
        for (label, value) in [("start", self.start), ("end", self.end), ("duration", self.duration)] {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(Error::invalid_input(format!(
                        "{label} must be a non-negative number of seconds, got {value}"
                    )));
                }
            }
        }

        let start = self.start.or(match (self.end, self.duration) {
            (Some(end), Some(duration)) => Some(end - duration),
            _ => None,
        });
        let duration = self.duration.or(match (start, self.end) {
            (Some(start), Some(end)) => Some(end - start),
            (None, Some(end)) => Some(end),
            _ => None,
        });

        if start.is_some_and(|s| s < 0.0) || duration.is_some_and(|d| d <= 0.0) {
            return Err(Error::invalid_input(format!(
                "empty or inverted window for {}",
                self.name
            )));
        }

        Ok((start.filter(|s| *s > 0.0), duration))
    }
}

/// Default audio codec for a target container.
pub fn default_codec(format: &str) -> &'static str {
    match format {
        "wav" => "pcm_s16le",
        _ => "copy",
    }
}

/// `-i <source> -vn [-f <format>] -acodec <codec> <target>`
///
/// `-f` is left out when neither the options nor the target name give a
/// format.
pub fn decode_arguments(source_name: &str, target_name: &str, options: &DecodeOptions) -> Vec<String> {
    let format = options
        .format
        .clone()
        .or_else(|| extension_of(target_name).map(str::to_lowercase))
        .filter(|format| !format.trim().is_empty());
    let codec = options.codec.clone().unwrap_or_else(|| "copy".to_string());

    let mut args = vec!["-i".to_string(), source_name.to_string(), "-vn".to_string()];
    if let Some(format) = format {
        args.push("-f".to_string());
        args.push(format);
    }
    args.push("-acodec".to_string());
    args.push(codec);
    args.push(target_name.to_string());
    args
}

/// `-i <source> -vn [-ss start] [-t duration] [-f format] -acodec <codec> [modifiers] <target>`
pub fn transform_arguments(source_name: &str, target: &TargetSpec) -> Result<Vec<String>> {
    let (start, duration) = target.window()?;

    let mut args = vec!["-i".to_string(), source_name.to_string(), "-vn".to_string()];
    if let Some(start) = start {
        args.push("-ss".to_string());
        args.push(start.to_string());
    }
    if let Some(duration) = duration {
        args.push("-t".to_string());
        args.push(duration.to_string());
    }
    if let Some(format) = target.format.as_deref().filter(|f| !f.trim().is_empty()) {
        args.push("-f".to_string());
        args.push(format.to_string());
    }
    args.push("-acodec".to_string());
    args.push(target.target_codec());
    args.extend(target.modifiers.iter().cloned());
    args.push(target.name.clone());

    Ok(args)
}
