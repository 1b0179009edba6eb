//! Process-backed execution unit.
//!
//! A [`CommandUnit`] is a long-lived tokio task that accepts run requests one
//! at a time. For each run it stages a scratch [`Workspace`], spawns the engine
//! executable inside it, forwards the engine's output line by line, and ends
//! the run with `done` (carrying the files the engine produced) or `exit`.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mediabridge_common::{Error, FormatKey, Result, UnitId};

use crate::protocol::{EngineMessage, EngineResult, RunRequest};
use crate::tools::resolve_engine;
use crate::unit::{
    message_channel, EngineLocator, ExecutionUnit, MessageSink, MessageStream, UnitEvent,
    UnitFactory,
};
use crate::workspace::Workspace;

/// A queued run, together with the sink its messages go to.
struct Job {
    request: RunRequest,
    sink: MessageSink,
}

/// Execution unit that runs the engine as a child process per run.
#[derive(Debug)]
pub struct CommandUnit {
    id: UnitId,
    format: FormatKey,
    jobs: mpsc::UnboundedSender<Job>,
    worker: Mutex<Option<JoinHandle<()>>>,
    terminated: AtomicBool,
}

impl CommandUnit {
    /// Start a unit for `format` running `program`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        format: FormatKey,
        program: PathBuf,
        args_prefix: Vec<String>,
        scratch_root: Option<PathBuf>,
    ) -> Self {
        let id = UnitId::new();
        let (jobs, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            unit: id,
            program,
            args_prefix,
            scratch_root,
        };
        let handle = tokio::spawn(worker.run(rx));

        tracing::info!(unit = %id, format = %format, "Execution unit started");

        Self {
            id,
            format,
            jobs,
            worker: Mutex::new(Some(handle)),
            terminated: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ExecutionUnit for CommandUnit {
    fn id(&self) -> UnitId {
        self.id
    }

    fn format(&self) -> &FormatKey {
        &self.format
    }

    fn post(&self, request: RunRequest) -> Result<MessageStream> {
        if self.is_terminated() {
            return Err(Error::unit_failure(format!("unit {} was terminated", self.id)));
        }

        let (sink, stream) = message_channel();
        self.jobs
            .send(Job { request, sink })
            .map_err(|_| Error::unit_failure(format!("unit {} worker stopped", self.id)))?;
        Ok(stream)
    }

    async fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            // Aborting drops the in-flight child, which kills it.
            let _ = handle.await;
            tracing::info!(unit = %self.id, format = %self.format, "Execution unit terminated");
        }
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

impl Drop for CommandUnit {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            handle.abort();
        }
    }
}

/// The task behind a [`CommandUnit`].
struct Worker {
    unit: UnitId,
    program: PathBuf,
    args_prefix: Vec<String>,
    scratch_root: Option<PathBuf>,
}

impl Worker {
    async fn run(self, mut jobs: mpsc::UnboundedReceiver<Job>) {
        let mut announced = false;

        while let Some(Job { request, sink }) = jobs.recv().await {
            if !announced {
                let _ = sink.send(UnitEvent::Message(EngineMessage::Ready));
                announced = true;
            }
            let _ = sink.send(UnitEvent::Message(EngineMessage::Run));

            let terminal = match self.execute(&request, &sink).await {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(unit = %self.unit, "Run failed inside unit: {e}");
                    EngineMessage::Error(e.to_string())
                }
            };
            // The receiver may already be gone if the caller stopped listening.
            let _ = sink.send(UnitEvent::Message(terminal));
        }
    }

    async fn execute(&self, request: &RunRequest, sink: &MessageSink) -> Result<EngineMessage> {
        let mut workspace = Workspace::new(self.scratch_root.as_deref())?;
        workspace.stage(request)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args_prefix)
            .args(&request.arguments)
            .current_dir(workspace.dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(unit = %self.unit, args = ?request.arguments, "Spawning engine");

        let mut child = cmd.spawn().map_err(|e| {
            Error::unit_failure(format!("failed to spawn {}: {e}", self.program.display()))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::unit_failure("engine stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::unit_failure("engine stderr not captured"))?;

        let mut out_lines = BufReader::new(stdout).split(b'\n');
        let mut err_lines = BufReader::new(stderr).split(b'\n');
        let (mut out_open, mut err_open) = (true, true);

        while out_open || err_open {
            tokio::select! {
                segment = out_lines.next_segment(), if out_open => match segment {
                    Ok(Some(bytes)) => {
                        let line = String::from_utf8_lossy(&bytes).to_string();
                        let _ = sink.send(UnitEvent::Message(EngineMessage::Stdout(line)));
                    }
                    _ => out_open = false,
                },
                segment = err_lines.next_segment(), if err_open => match segment {
                    Ok(Some(bytes)) => {
                        let line = String::from_utf8_lossy(&bytes).to_string();
                        let _ = sink.send(UnitEvent::Message(EngineMessage::Stderr(line)));
                    }
                    _ => err_open = false,
                },
            }
        }

        let status = child.wait().await?;
        match status.code() {
            Some(0) => Ok(EngineMessage::Done(EngineResult {
                files: workspace.collect_outputs()?,
            })),
            code => Ok(EngineMessage::Exit(code.unwrap_or(-1))),
        }
    }
}

/// Factory producing [`CommandUnit`]s.
#[derive(Debug, Clone, Default)]
pub struct CommandUnitFactory {
    scratch_root: Option<PathBuf>,
}

impl CommandUnitFactory {
    /// Create a factory whose units stage runs under `scratch_root`
    /// (the system temp dir when `None`).
    pub fn new(scratch_root: Option<PathBuf>) -> Self {
        Self { scratch_root }
    }
}

impl UnitFactory for CommandUnitFactory {
    fn spawn(&self, format: &FormatKey, locator: &EngineLocator) -> Result<Arc<dyn ExecutionUnit>> {
        let program = resolve_engine(&locator.program)?;
        Ok(Arc::new(CommandUnit::start(
            format.clone(),
            program,
            locator.args_prefix.clone(),
            self.scratch_root.clone(),
        )))
    }
}
