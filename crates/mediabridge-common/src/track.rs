//! The [`Track`] value object: a named, typed binary payload.

use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::format::extension_of;
use crate::Result;

/// MIME type used when the content could not be sniffed.
const FALLBACK_MIME: &str = "application/octet-stream";

/// Named binary payload with its sniffed (or declared) format and MIME type.
///
/// A track is immutable once constructed. The format comes from the content's
/// magic bytes when they are recognized and from the name's extension
/// otherwise; the MIME type is only known in the first case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub format: String,
    pub mime: Option<String>,
    pub data: Bytes,
}

/// Materialized binary view of a track, suitable for handing to a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Bytes,
    pub mime: String,
}

impl Track {
    /// Build a track from a name and its bytes, sniffing the content type.
    ///
    /// # Examples
    ///
    /// ```
    /// use mediabridge_common::Track;
    ///
    /// let track = Track::new("voice.wav", Vec::new());
    /// assert_eq!(track.format, "wav");
    /// assert_eq!(track.mime, None);
    /// ```
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let name = name.into();
        let data = data.into();
        let (format, mime) = match infer::get(&data) {
            Some(kind) => (
                kind.extension().to_string(),
                Some(kind.mime_type().to_string()),
            ),
            None => (
                extension_of(&name).unwrap_or_default().to_lowercase(),
                None,
            ),
        };

        Self {
            name,
            format,
            mime,
            data,
        }
    }

    /// Read a track from disk, naming it after the file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self::new(name, data))
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Materialized view of the payload with a concrete MIME type.
    pub fn as_blob(&self) -> Blob {
        Blob {
            data: self.data.clone(),
            mime: self.mime.clone().unwrap_or_else(|| FALLBACK_MIME.to_string()),
        }
    }

    /// Self-contained `data:` URL for the payload.
    pub fn to_data_url(&self) -> String {
        let blob = self.as_blob();
        format!(
            "data:{};base64,{}",
            blob.mime,
            base64::engine::general_purpose::STANDARD.encode(&blob.data)
        )
    }

    /// Write the payload to `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }
}
