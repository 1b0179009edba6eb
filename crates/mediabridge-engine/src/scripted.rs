//! Execution units driven by pre-recorded message scripts.
//!
//! A [`ScriptedFactory`] builds units that answer every run by replaying the
//! [`Step`]s its responder returns for that request. The factory records
//! every run it sees and how many runs were active at once per format, which
//! makes it the tool of choice for exercising converter and bridge logic
//! without an engine binary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use mediabridge_common::{FormatKey, Result, UnitId};

use crate::protocol::{EngineMessage, EngineResult, NamedBuffer, RunRequest};
use crate::unit::{message_channel, EngineLocator, ExecutionUnit, MessageStream, UnitEvent, UnitFactory};

/// One step of a scripted run.
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver an event to the run's channel.
    Emit(UnitEvent),
    /// Pause before the next step.
    Sleep(Duration),
    /// Close the channel without a terminal message.
    Crash,
}

impl Step {
    pub fn stdout(line: impl Into<String>) -> Self {
        Self::Emit(UnitEvent::Message(EngineMessage::Stdout(line.into())))
    }

    pub fn stderr(line: impl Into<String>) -> Self {
        Self::Emit(UnitEvent::Message(EngineMessage::Stderr(line.into())))
    }

    pub fn done(files: Vec<NamedBuffer>) -> Self {
        Self::Emit(UnitEvent::Message(EngineMessage::Done(EngineResult { files })))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Emit(UnitEvent::Message(EngineMessage::Error(message.into())))
    }

    pub fn exit(code: i32) -> Self {
        Self::Emit(UnitEvent::Message(EngineMessage::Exit(code)))
    }

    pub fn fault(message: impl Into<String>) -> Self {
        Self::Emit(UnitEvent::Fault(message.into()))
    }

    pub fn sleep_ms(ms: u64) -> Self {
        Self::Sleep(Duration::from_millis(ms))
    }

    fn is_terminal(&self) -> bool {
        match self {
            Self::Emit(UnitEvent::Message(message)) => message.is_terminal(),
            Self::Emit(UnitEvent::Fault(_)) | Self::Crash => true,
            Self::Sleep(_) => false,
        }
    }
}

/// Produces the script for a run.
pub type Responder = Arc<dyn Fn(&RunRequest) -> Vec<Step> + Send + Sync>;

/// A run observed by a [`ScriptedFactory`].
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub unit: UnitId,
    pub format: FormatKey,
    pub request: RunRequest,
}

#[derive(Default)]
struct Ledger {
    runs: Vec<RunRecord>,
    active: HashMap<FormatKey, usize>,
    max_active: HashMap<FormatKey, usize>,
    units: Vec<Arc<ScriptedUnit>>,
}

impl Ledger {
    fn started(&mut self, record: RunRecord) {
        let active = self.active.entry(record.format.clone()).or_default();
        *active += 1;
        let active = *active;
        let max = self.max_active.entry(record.format.clone()).or_default();
        *max = (*max).max(active);
        self.runs.push(record);
    }

    fn finished(&mut self, format: &FormatKey) {
        if let Some(active) = self.active.get_mut(format) {
            *active = active.saturating_sub(1);
        }
    }
}

/// Factory for [`ScriptedUnit`]s sharing one responder and one ledger.
#[derive(Clone)]
pub struct ScriptedFactory {
    responder: Responder,
    ledger: Arc<Mutex<Ledger>>,
}

impl ScriptedFactory {
    /// Create a factory answering runs with `responder`.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&RunRequest) -> Vec<Step> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            ledger: Arc::new(Mutex::new(Ledger::default())),
        }
    }

    /// Every run issued so far, in issue order.
    pub fn runs(&self) -> Vec<RunRecord> {
        self.ledger.lock().runs.clone()
    }

    /// Number of units created so far.
    pub fn spawned(&self) -> usize {
        self.ledger.lock().units.len()
    }

    /// Every unit created so far, oldest first.
    pub fn units(&self) -> Vec<Arc<ScriptedUnit>> {
        self.ledger.lock().units.clone()
    }

    /// Highest number of simultaneously active runs seen for `format`.
    pub fn max_concurrent(&self, format: &FormatKey) -> usize {
        self.ledger
            .lock()
            .max_active
            .get(format)
            .copied()
            .unwrap_or_default()
    }
}

impl UnitFactory for ScriptedFactory {
    fn spawn(&self, format: &FormatKey, _locator: &EngineLocator) -> Result<Arc<dyn ExecutionUnit>> {
        let unit = Arc::new(ScriptedUnit {
            id: UnitId::new(),
            format: format.clone(),
            responder: self.responder.clone(),
            ledger: self.ledger.clone(),
            terminated: AtomicBool::new(false),
        });
        self.ledger.lock().units.push(unit.clone());
        Ok(unit)
    }
}

/// Unit replaying scripted steps for each run.
pub struct ScriptedUnit {
    id: UnitId,
    format: FormatKey,
    responder: Responder,
    ledger: Arc<Mutex<Ledger>>,
    terminated: AtomicBool,
}

impl std::fmt::Debug for ScriptedUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedUnit")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[async_trait]
impl ExecutionUnit for ScriptedUnit {
    fn id(&self) -> UnitId {
        self.id
    }

    fn format(&self) -> &FormatKey {
        &self.format
    }

    fn post(&self, request: RunRequest) -> Result<MessageStream> {
        if self.is_terminated() {
            return Err(mediabridge_common::Error::unit_failure("scripted unit terminated"));
        }

        let steps = (self.responder)(&request);
        self.ledger.lock().started(RunRecord {
            unit: self.id,
            format: self.format.clone(),
            request,
        });

        let (sink, stream) = message_channel();
        let ledger = self.ledger.clone();
        let format = self.format.clone();
        tokio::spawn(async move {
            let mut finished = false;
            for step in steps {
                if step.is_terminal() && !finished {
                    ledger.lock().finished(&format);
                    finished = true;
                }
                match step {
                    Step::Emit(event) => {
                        let _ = sink.send(event);
                    }
                    Step::Sleep(duration) => tokio::time::sleep(duration).await,
                    Step::Crash => break,
                }
            }
            if !finished {
                ledger.lock().finished(&format);
            }
        });

        Ok(stream)
    }

    async fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}
