//! Message protocol spoken between the converter and an execution unit.
//!
//! The converter sends one [`RunRequest`] per run; the unit answers with a
//! sequence of [`EngineMessage`]s that ends in exactly one terminal message
//! (`done`, `error`, or `exit`). Both types serialize to the `{type, data}`
//! JSON shape so units living behind a serialization boundary can speak the
//! same protocol.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use mediabridge_common::{Error, Result, Track};

/// Directory where source tracks are mounted inside the unit.
pub const WORKERFS_DIRECTORY: &str = "/data";

/// A named input or output byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedBuffer {
    pub name: String,
    pub data: Bytes,
}

impl NamedBuffer {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

impl From<&Track> for NamedBuffer {
    fn from(track: &Track) -> Self {
        Self {
            name: track.name.clone(),
            data: track.data.clone(),
        }
    }
}

impl From<NamedBuffer> for Track {
    fn from(buffer: NamedBuffer) -> Self {
        Track::new(buffer.name, buffer.data)
    }
}

/// Kind of virtual filesystem a mount is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FsKind {
    /// Read-only view over caller-provided blobs.
    Workerfs,
    /// Writable in-memory filesystem.
    Memfs,
}

/// Options of a mount; currently only the blobs to expose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountOptions {
    #[serde(default)]
    pub blobs: Vec<NamedBuffer>,
}

/// One filesystem mount requested for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    #[serde(rename = "type")]
    pub kind: FsKind,
    pub opts: MountOptions,
    pub mountpoint: String,
}

impl Mount {
    /// Mount the given blobs read-only at [`WORKERFS_DIRECTORY`].
    pub fn workerfs(blobs: Vec<NamedBuffer>) -> Self {
        Self {
            kind: FsKind::Workerfs,
            opts: MountOptions { blobs },
            mountpoint: WORKERFS_DIRECTORY.to_string(),
        }
    }
}

/// A single engine invocation.
///
/// Immutable once built; ownership moves into the unit when the run is
/// issued.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub arguments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
    #[serde(rename = "MEMFS", default, skip_serializing_if = "Vec::is_empty")]
    pub buffers: Vec<NamedBuffer>,
}

impl RunRequest {
    /// Create a request from an argument vector.
    pub fn new(arguments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            arguments: arguments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Create a request from a whitespace-separated command line.
    ///
    /// # Examples
    ///
    /// ```
    /// use mediabridge_engine::RunRequest;
    ///
    /// let request = RunRequest::from_command_line("  -hide_banner   -formats ");
    /// assert_eq!(request.arguments, vec!["-hide_banner", "-formats"]);
    /// ```
    pub fn from_command_line(line: &str) -> Self {
        Self::new(line.split_whitespace())
    }

    /// Add a filesystem mount.
    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Add an in-memory buffer.
    pub fn with_buffer(mut self, buffer: NamedBuffer) -> Self {
        self.buffers.push(buffer);
        self
    }

    /// Mount `track` at [`WORKERFS_DIRECTORY`] and expose it as an in-memory
    /// buffer, so the engine can address it by bare name.
    pub fn with_track(self, track: &Track) -> Self {
        let buffer = NamedBuffer::from(track);
        self.with_mount(Mount::workerfs(vec![buffer.clone()]))
            .with_buffer(buffer)
    }
}

/// Result payload carried by a `done` message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineResult {
    #[serde(rename = "MEMFS", default)]
    pub files: Vec<NamedBuffer>,
}

/// A message emitted by an execution unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum EngineMessage {
    /// The unit finished loading.
    Ready,
    /// The unit accepted a run request.
    Run,
    /// A chunk of the engine's standard output.
    Stdout(String),
    /// A chunk of the engine's standard error.
    Stderr(String),
    /// The run succeeded.
    Done(EngineResult),
    /// The unit hit an internal error.
    Error(String),
    /// The engine exited with the given status.
    Exit(i32),
}

/// Tags [`EngineMessage::from_value`] decodes as-is.
const KNOWN_TAGS: &[&str] = &["ready", "run", "stdout", "stderr", "done", "error", "exit"];

impl EngineMessage {
    /// Decode a message from its JSON form.
    ///
    /// Unrecognized tags are treated as `exit`, carrying the `data` field as
    /// status when it is an integer and `-1` otherwise.
    pub fn from_value(value: Value) -> Result<Self> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if KNOWN_TAGS.contains(&tag.as_str()) {
            return Ok(serde_json::from_value(value)?);
        }

        let code = value
            .get("data")
            .and_then(Value::as_i64)
            .and_then(|code| i32::try_from(code).ok())
            .unwrap_or(-1);
        Ok(Self::Exit(code))
    }

    /// Whether this message ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error(_) | Self::Exit(_))
    }
}

/// Check that a buffer name is a single plain file name.
pub fn validate_buffer_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\');
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_input(format!(
            "buffer name must be a plain file name: {name:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_request_wire_shape() {
        let track = Track::new("a.webm", vec![1u8, 2]);
        let request = RunRequest::new(["-i", "a.webm"]).with_track(&track);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["arguments"], json!(["-i", "a.webm"]));
        assert_eq!(value["mounts"][0]["type"], "WORKERFS");
        assert_eq!(value["mounts"][0]["mountpoint"], "/data");
        assert_eq!(value["mounts"][0]["opts"]["blobs"][0]["name"], "a.webm");
        assert_eq!(value["MEMFS"][0]["name"], "a.webm");
    }

    #[test]
    fn bare_request_omits_mounts() {
        let value = serde_json::to_value(RunRequest::from_command_line("-codecs")).unwrap();
        assert_eq!(value, json!({ "arguments": ["-codecs"] }));
    }

    #[test]
    fn decode_known_messages() {
        let msg = EngineMessage::from_value(json!({ "type": "stdout", "data": "hello" })).unwrap();
        assert_eq!(msg, EngineMessage::Stdout("hello".into()));

        let msg = EngineMessage::from_value(json!({ "type": "ready" })).unwrap();
        assert_eq!(msg, EngineMessage::Ready);

        let msg = EngineMessage::from_value(json!({ "type": "exit", "data": 7 })).unwrap();
        assert_eq!(msg, EngineMessage::Exit(7));

        let msg = EngineMessage::from_value(json!({
            "type": "done",
            "data": { "MEMFS": [{ "name": "a.wav", "data": [82, 73] }] }
        }))
        .unwrap();
        match msg {
            EngineMessage::Done(result) => {
                assert_eq!(result.files.len(), 1);
                assert_eq!(result.files[0].name, "a.wav");
                assert_eq!(&result.files[0].data[..], b"RI");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_is_exit() {
        let msg = EngineMessage::from_value(json!({ "type": "abort", "data": 3 })).unwrap();
        assert_eq!(msg, EngineMessage::Exit(3));

        let msg = EngineMessage::from_value(json!({ "something": "else" })).unwrap();
        assert_eq!(msg, EngineMessage::Exit(-1));
    }

    #[test]
    fn malformed_known_tag_is_error() {
        let result = EngineMessage::from_value(json!({ "type": "stdout", "data": 5 }));
        assert!(result.is_err());
    }

    #[test]
    fn terminal_messages() {
        assert!(EngineMessage::Done(EngineResult::default()).is_terminal());
        assert!(EngineMessage::Error("x".into()).is_terminal());
        assert!(EngineMessage::Exit(0).is_terminal());
        assert!(!EngineMessage::Stderr("x".into()).is_terminal());
        assert!(!EngineMessage::Ready.is_terminal());
    }

    #[test]
    fn buffer_names() {
        assert!(validate_buffer_name("a.webm").is_ok());
        assert!(validate_buffer_name("../etc/passwd").is_err());
        assert!(validate_buffer_name("..").is_err());
        assert!(validate_buffer_name("").is_err());
    }
}
