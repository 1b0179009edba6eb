//! Execution-unit sessions, one per registered format.
//!
//! A [`Session`] lazily creates its unit on first use and keeps it for
//! subsequent runs. After a run the session either soft-resets (detach the
//! run's handler, keep the unit) or hard-resets (terminate the unit so the
//! next run starts a fresh one), as decided by the demultiplexer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use mediabridge_common::{FormatKey, Result, UnitId};
use mediabridge_engine::{EngineLocator, ExecutionUnit, RunRequest, UnitFactory};

use crate::demux::{self, Reset, RunOutput};
use crate::registry::FormatRegistry;

/// The unit slot for a single format.
pub struct Session {
    format: FormatKey,
    locator: EngineLocator,
    factory: Arc<dyn UnitFactory>,
    unit: Mutex<Option<Arc<dyn ExecutionUnit>>>,
    attached: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("format", &self.format)
            .field("locator", &self.locator)
            .field("unit", &self.unit_id())
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl Session {
    pub fn new(format: FormatKey, locator: EngineLocator, factory: Arc<dyn UnitFactory>) -> Self {
        Self {
            format,
            locator,
            factory,
            unit: Mutex::new(None),
            attached: AtomicBool::new(false),
        }
    }

    pub fn format(&self) -> &FormatKey {
        &self.format
    }

    /// Return the live unit, creating one if there is none.
    pub fn ensure_unit(&self) -> Result<Arc<dyn ExecutionUnit>> {
        let mut slot = self.unit.lock();

        if let Some(unit) = slot.as_ref() {
            if !unit.is_terminated() {
                return Ok(unit.clone());
            }
        }

        let unit = self.factory.spawn(&self.format, &self.locator)?;
        tracing::debug!(format = %self.format, unit = %unit.id(), "Created execution unit");
        *slot = Some(unit.clone());
        Ok(unit)
    }

    /// Identity of the current unit, if one exists.
    pub fn unit_id(&self) -> Option<UnitId> {
        self.unit.lock().as_ref().map(|unit| unit.id())
    }

    /// Whether a run's handler is currently attached.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Detach the run's handler and keep the unit.
    pub fn reset_soft(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    /// Detach the handler, then terminate and discard the unit.
    pub async fn reset_hard(&self) {
        self.attached.store(false, Ordering::SeqCst);
        let unit = self.unit.lock().take();
        if let Some(unit) = unit {
            unit.terminate().await;
            tracing::debug!(format = %self.format, unit = %unit.id(), "Discarded execution unit");
        }
    }

    /// Hard-reset only if `unit` is still the session's current unit.
    async fn discard(&self, unit: &Arc<dyn ExecutionUnit>) {
        self.attached.store(false, Ordering::SeqCst);
        {
            let mut slot = self.unit.lock();
            if slot.as_ref().is_some_and(|current| current.id() == unit.id()) {
                slot.take();
            }
        }
        unit.terminate().await;
        tracing::debug!(format = %self.format, unit = %unit.id(), "Discarded execution unit");
    }

    /// Run `request` on this session's unit and apply the resulting reset.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutput> {
        let unit = self.ensure_unit()?;
        self.attached.store(true, Ordering::SeqCst);

        let (outcome, reset) = demux::run_once(unit.as_ref(), request).await;
        match reset {
            Reset::Soft => self.reset_soft(),
            Reset::Hard => self.discard(&unit).await,
        }
        outcome
    }
}

/// All sessions of a converter, keyed by format.
pub struct SessionPool {
    registry: Arc<FormatRegistry>,
    factory: Arc<dyn UnitFactory>,
    sessions: Mutex<HashMap<FormatKey, Arc<Session>>>,
}

impl SessionPool {
    pub fn new(registry: Arc<FormatRegistry>, factory: Arc<dyn UnitFactory>) -> Self {
        Self {
            registry,
            factory,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Session for `format`.
    ///
    /// # Errors
    ///
    /// Returns [`mediabridge_common::Error::UnsupportedFormat`] for keys not in
    /// the registry. No unit is created in that case.
    pub fn session(&self, format: &FormatKey) -> Result<Arc<Session>> {
        let locator = self.registry.locator(format)?;

        let mut sessions = self.sessions.lock();
        let session = sessions.entry(format.clone()).or_insert_with(|| {
            Arc::new(Session::new(format.clone(), locator.clone(), self.factory.clone()))
        });
        Ok(session.clone())
    }

    pub fn ensure_unit(&self, format: &FormatKey) -> Result<Arc<dyn ExecutionUnit>> {
        self.session(format)?.ensure_unit()
    }

    pub fn reset_soft(&self, format: &FormatKey) {
        if let Some(session) = self.existing(format) {
            session.reset_soft();
        }
    }

    pub async fn reset_hard(&self, format: &FormatKey) {
        if let Some(session) = self.existing(format) {
            session.reset_hard().await;
        }
    }

    /// Identity of the unit currently serving `format`.
    pub fn unit_id(&self, format: &FormatKey) -> Option<UnitId> {
        self.existing(format).and_then(|session| session.unit_id())
    }

    /// Terminate every unit.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.lock().values().cloned().collect();
        for session in sessions {
            session.reset_hard().await;
        }
    }

    fn existing(&self, format: &FormatKey) -> Option<Arc<Session>> {
        self.sessions.lock().get(format).cloned()
    }
}
