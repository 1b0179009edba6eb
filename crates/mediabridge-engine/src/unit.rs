//! The execution-unit abstraction.
//!
//! An [`ExecutionUnit`] is an isolated worker hosting the transcoding engine.
//! Every run gets its own [`MessageStream`]: the receiver is the run's message
//! handler, and dropping it detaches the handler. No handler state is shared
//! between runs.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use mediabridge_common::{FormatKey, Result, UnitId};

use crate::protocol::{EngineMessage, RunRequest};

/// An event observed on a unit's per-run channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitEvent {
    /// A protocol message from the engine.
    Message(EngineMessage),
    /// The unit itself failed; its state is unknown.
    Fault(String),
}

/// Receiving half of one run's event channel.
pub type MessageStream = mpsc::UnboundedReceiver<UnitEvent>;

/// Sending half of one run's event channel, held by the unit.
pub type MessageSink = mpsc::UnboundedSender<UnitEvent>;

/// Create a fresh per-run channel.
pub fn message_channel() -> (MessageSink, MessageStream) {
    mpsc::unbounded_channel()
}

/// Where the engine for a format lives and how to invoke it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLocator {
    /// Program path or bare name looked up in `PATH`.
    pub program: PathBuf,
    /// Arguments prepended to every run's argument vector.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args_prefix: Vec<String>,
}

impl EngineLocator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args_prefix: Vec::new(),
        }
    }
}

/// An isolated worker running the transcoding engine.
#[async_trait]
pub trait ExecutionUnit: Send + Sync + fmt::Debug {
    /// Identity of this unit instance.
    fn id(&self) -> UnitId;

    /// The format this unit serves.
    fn format(&self) -> &FormatKey;

    /// Issue a run and return the channel its messages arrive on.
    ///
    /// The stream ends after a terminal message, or early if the unit dies.
    fn post(&self, request: RunRequest) -> Result<MessageStream>;

    /// Stop the unit and release its resources. Idempotent.
    async fn terminate(&self);

    /// Whether [`terminate`](ExecutionUnit::terminate) has been called.
    fn is_terminated(&self) -> bool;
}

/// Creates execution units for registered formats.
pub trait UnitFactory: Send + Sync {
    /// Allocate a new unit for `format` from its locator.
    fn spawn(&self, format: &FormatKey, locator: &EngineLocator) -> Result<Arc<dyn ExecutionUnit>>;
}
