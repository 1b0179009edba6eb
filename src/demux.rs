//! Reduces one run's message stream to a single outcome.
//!
//! A run's channel carries any number of informational messages followed by
//! exactly one terminal message. [`receive`] keeps a single ordered log of the
//! output lines seen, and on the terminal message decides both the outcome
//! of the run and whether the unit can be reused ([`Reset::Soft`]) or must be
//! torn down ([`Reset::Hard`]).

use serde::{Deserialize, Serialize};

use mediabridge_common::lines::split_lines;
use mediabridge_common::{Error, Result};
use mediabridge_engine::{EngineMessage, ExecutionUnit, MessageStream, NamedBuffer, RunRequest, UnitEvent};

/// What happens to the unit after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reset {
    /// Keep the unit; only the run's handler is detached.
    Soft,
    /// Terminate and discard the unit.
    Hard,
}

/// Result of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    /// Files the engine produced, or `None` if it exited cleanly without
    /// reporting a result.
    pub files: Option<Vec<NamedBuffer>>,
    /// Every output line, stdout and stderr interleaved in arrival order.
    pub output: Vec<String>,
    /// Only the stdout lines.
    pub stdout: Vec<String>,
    /// Only the stderr lines.
    pub stderr: Vec<String>,
}

impl RunOutput {
    /// The first produced file, if any.
    pub fn first_file(&self) -> Option<&NamedBuffer> {
        self.files.as_ref().and_then(|files| files.first())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Append-only log of output chunks in arrival order.
#[derive(Debug, Default)]
struct OutputLog {
    entries: Vec<(Stream, String)>,
}

impl OutputLog {
    fn push(&mut self, stream: Stream, chunk: String) {
        self.entries.push((stream, chunk));
    }

    fn lines(&self, only: Option<Stream>) -> Vec<String> {
        split_lines(
            self.entries
                .iter()
                .filter(|(stream, _)| only.is_none() || only == Some(*stream))
                .map(|(_, chunk)| chunk.as_str()),
        )
    }

    fn finish(self, files: Option<Vec<NamedBuffer>>) -> RunOutput {
        RunOutput {
            output: self.lines(None),
            stdout: self.lines(Some(Stream::Stdout)),
            stderr: self.lines(Some(Stream::Stderr)),
            files,
        }
    }
}

/// Issue `request` on `unit` and wait for its outcome.
pub async fn run_once(unit: &dyn ExecutionUnit, request: RunRequest) -> (Result<RunOutput>, Reset) {
    match unit.post(request) {
        Ok(stream) => receive(stream).await,
        Err(e) => (Err(e), Reset::Hard),
    }
}

/// Consume a run's stream up to and including its terminal message.
pub async fn receive(mut stream: MessageStream) -> (Result<RunOutput>, Reset) {
    let mut log = OutputLog::default();

    while let Some(event) = stream.recv().await {
        let message = match event {
            UnitEvent::Message(message) => message,
            UnitEvent::Fault(fault) => {
                tracing::warn!("Execution unit faulted: {fault}");
                return (Err(Error::unit_failure(fault)), Reset::Hard);
            }
        };

        match message {
            EngineMessage::Ready => tracing::debug!("Execution unit ready"),
            EngineMessage::Run => tracing::debug!("Execution unit accepted run"),
            EngineMessage::Stdout(chunk) => {
                tracing::debug!("{chunk}");
                log.push(Stream::Stdout, chunk);
            }
            EngineMessage::Stderr(chunk) => {
                tracing::debug!("{chunk}");
                log.push(Stream::Stderr, chunk);
            }
            EngineMessage::Done(result) => {
                return (Ok(log.finish(Some(result.files))), Reset::Soft);
            }
            EngineMessage::Error(message) => {
                tracing::warn!("Execution unit reported an error: {message}");
                return (Err(Error::unit_failure(message)), Reset::Hard);
            }
            EngineMessage::Exit(0) => return (Ok(log.finish(None)), Reset::Soft),
            EngineMessage::Exit(code) => {
                tracing::debug!("Engine exited with status {code}");
                return (Err(Error::ProcessExit { code }), Reset::Soft);
            }
        }
    }

    (
        Err(Error::unit_failure("run channel closed before a terminal message")),
        Reset::Hard,
    )
}
