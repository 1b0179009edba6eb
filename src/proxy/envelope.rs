//! Bridge envelopes and the typed requests they carry.
//!
//! On the wire an action is `{id, type, args}` and a response is
//! `{id, data?, track?, error?}`. Both sides convert through
//! [`BridgeRequest`] and [`BridgeReply`] so argument layouts are defined in
//! exactly one place.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use mediabridge_common::{CorrelationId, Error, FormatKey, Result, Track};

use crate::converter::{DecodeOptions, TargetSpec};

pub const RUN_RAW_COMMAND: &str = "run-raw-command";
pub const DECODE: &str = "decode";
pub const ENCODE: &str = "encode";
pub const INFO: &str = "info";
pub const TRANSFORM: &str = "transform";

/// Action sent from the caller to the remote host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    pub id: CorrelationId,
    #[serde(rename = "type")]
    pub operation: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Response sent from the remote host back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: CorrelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<Track>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    pub fn data(id: CorrelationId, data: Value) -> Self {
        Self {
            id,
            data: Some(data),
            track: None,
            error: None,
        }
    }

    pub fn track(id: CorrelationId, track: Track) -> Self {
        Self {
            id,
            data: None,
            track: Some(track),
            error: None,
        }
    }

    pub fn error(id: CorrelationId, error: impl Into<String>) -> Self {
        Self {
            id,
            data: None,
            track: None,
            error: Some(error.into()),
        }
    }

    /// Interpret the response: an `error` field wins, then a track, then data.
    pub fn into_reply(self) -> Result<BridgeReply> {
        if let Some(error) = self.error {
            return Err(Error::Remote(error));
        }
        match self.track {
            Some(track) => Ok(BridgeReply::Track(track)),
            None => Ok(BridgeReply::Data(self.data.unwrap_or(Value::Null))),
        }
    }
}

/// Messages the remote host posts to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "lowercase")]
pub enum HostMessage {
    /// The host finished loading and accepts actions.
    Ready,
    Response(ResponseEnvelope),
}

/// Payload of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeReply {
    Track(Track),
    Data(Value),
}

impl BridgeReply {
    pub fn into_track(self) -> Result<Track> {
        match self {
            Self::Track(track) => Ok(track),
            Self::Data(_) => Err(Error::Remote("expected a track in the response".into())),
        }
    }

    pub fn into_data<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Self::Data(value) => Ok(serde_json::from_value(value)?),
            Self::Track(_) => Err(Error::Remote("expected data in the response".into())),
        }
    }
}

/// A converter operation and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeRequest {
    RunRawCommand { format: FormatKey, arguments: String },
    Decode { source: Track, target: String, options: DecodeOptions },
    Encode { source: Track, target: TargetSpec },
    Transform { source: Track, target: TargetSpec },
    Info { format: FormatKey },
}

impl BridgeRequest {
    /// Wire name of the operation.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::RunRawCommand { .. } => RUN_RAW_COMMAND,
            Self::Decode { .. } => DECODE,
            Self::Encode { .. } => ENCODE,
            Self::Transform { .. } => TRANSFORM,
            Self::Info { .. } => INFO,
        }
    }

    /// Format key whose queue the request runs on.
    pub fn format(&self) -> FormatKey {
        match self {
            Self::RunRawCommand { format, .. } | Self::Info { format } => format.clone(),
            Self::Decode { source, .. } | Self::Encode { source, .. } | Self::Transform { source, .. } => {
                if source.format.trim().is_empty() {
                    FormatKey::from_name(&source.name).unwrap_or_else(|| FormatKey::new(""))
                } else {
                    FormatKey::new(&source.format)
                }
            }
        }
    }

    /// Serialize into an action envelope with the given id.
    pub fn to_envelope(&self, id: CorrelationId) -> Result<ActionEnvelope> {
        let args = match self {
            Self::RunRawCommand { format, arguments } => {
                vec![serde_json::to_value(format)?, Value::String(arguments.clone())]
            }
            Self::Decode { source, target, options } => vec![
                serde_json::to_value(source)?,
                Value::String(target.clone()),
                serde_json::to_value(options)?,
            ],
            Self::Encode { source, target } | Self::Transform { source, target } => {
                vec![serde_json::to_value(source)?, serde_json::to_value(target)?]
            }
            Self::Info { format } => vec![serde_json::to_value(format)?],
        };

        Ok(ActionEnvelope {
            id,
            operation: self.operation().to_string(),
            args,
        })
    }

    /// Reconstruct a request from an action envelope.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperation`] for unknown operation names,
    /// [`Error::InvalidInput`] for missing or malformed arguments.
    pub fn from_envelope(envelope: &ActionEnvelope) -> Result<Self> {
        let args = Args {
            operation: &envelope.operation,
            values: &envelope.args,
        };

        match envelope.operation.as_str() {
            RUN_RAW_COMMAND => Ok(Self::RunRawCommand {
                format: args.required(0)?,
                arguments: args.required(1)?,
            }),
            DECODE => Ok(Self::Decode {
                source: args.required(0)?,
                target: args.required(1)?,
                options: args.optional(2)?.unwrap_or_default(),
            }),
            ENCODE => Ok(Self::Encode {
                source: args.required(0)?,
                target: args.required(1)?,
            }),
            TRANSFORM => Ok(Self::Transform {
                source: args.required(0)?,
                target: args.required(1)?,
            }),
            INFO => Ok(Self::Info {
                format: args.required(0)?,
            }),
            other => Err(Error::InvalidOperation(other.to_string())),
        }
    }
}

struct Args<'a> {
    operation: &'a str,
    values: &'a [Value],
}

impl Args<'_> {
    fn optional<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>> {
        match self.values.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                Error::invalid_input(format!("{} argument {index}: {e}", self.operation))
            }),
        }
    }

    fn required<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        self.optional(index)?.ok_or_else(|| {
            Error::invalid_input(format!("{} is missing argument {index}", self.operation))
        })
    }
}
