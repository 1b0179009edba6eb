//! The converter facade.
//!
//! Every operation is scheduled on the per-format [`TaskQueue`] at the moment
//! it is called and executed by the format's [`Session`](crate::session::Session).
//! The returned futures own everything they need, so they can be spawned or
//! polled in any order without changing execution order.

mod args;
mod info;

pub use args::{decode_arguments, default_codec, transform_arguments, DecodeOptions, TargetSpec};
pub use info::{
    parse_section, Capability, EngineCapabilities, CODECS_COMMAND, CODECS_HEADER, FORMATS_COMMAND,
    FORMATS_HEADER,
};

use std::future::Future;
use std::sync::Arc;

use mediabridge_common::{Error, FormatKey, Result, Track};
use mediabridge_engine::protocol::validate_buffer_name;
use mediabridge_engine::{check_engine, CommandUnitFactory, EngineInfo, RunRequest, UnitFactory};

use crate::config::BridgeConfig;
use crate::demux::RunOutput;
use crate::queue::TaskQueue;
use crate::registry::FormatRegistry;
use crate::session::SessionPool;

/// Drives the transcoding engine through per-format execution units.
///
/// Cheap to clone; clones share units and queues.
#[derive(Clone)]
pub struct Converter {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<FormatRegistry>,
    sessions: SessionPool,
    queue: TaskQueue<FormatKey>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("formats", &self.inner.registry.formats().collect::<Vec<_>>())
            .finish()
    }
}

impl Converter {
    /// Build a converter running engine processes as configured.
    pub fn new(config: &BridgeConfig) -> Result<Self> {
        let registry = FormatRegistry::from_config(config)?;
        let factory = CommandUnitFactory::new(config.workspace.root.clone());
        Ok(Self::with_factory(registry, Arc::new(factory)))
    }

    /// Build a converter whose units come from `factory`.
    pub fn with_factory(registry: FormatRegistry, factory: Arc<dyn UnitFactory>) -> Self {
        let registry = Arc::new(registry);
        Self {
            inner: Arc::new(Inner {
                sessions: SessionPool::new(registry.clone(), factory),
                registry,
                queue: TaskQueue::new(),
            }),
        }
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.inner.registry
    }

    pub fn sessions(&self) -> &SessionPool {
        &self.inner.sessions
    }

    pub fn queue(&self) -> &TaskQueue<FormatKey> {
        &self.inner.queue
    }

    /// Run a whitespace-separated command line on the engine for `format`.
    pub fn run_raw_command(
        &self,
        format: impl Into<FormatKey>,
        arguments: &str,
    ) -> impl Future<Output = Result<RunOutput>> + Send + 'static {
        self.run(format, RunRequest::from_command_line(arguments))
    }

    /// Run a prepared request on the engine for `format`.
    pub fn run(
        &self,
        format: impl Into<FormatKey>,
        request: RunRequest,
    ) -> impl Future<Output = Result<RunOutput>> + Send + 'static {
        let scheduled = self.schedule(format.into(), request);
        async move { scheduled?.await }
    }

    /// Extract the audio of `source` into a new container named `target_name`.
    pub fn decode(
        &self,
        source: &Track,
        target_name: &str,
        options: DecodeOptions,
    ) -> impl Future<Output = Result<Track>> + Send + 'static {
        let target_name = target_name.to_string();
        let scheduled = check_names(source, &target_name).and_then(|format| {
            let request = RunRequest::new(decode_arguments(&source.name, &target_name, &options))
                .with_track(source);
            self.schedule(format, request)
        });

        async move { output_track(scheduled?.await?, &target_name) }
    }

    /// Re-encode `source` into `target`, optionally clipped to a window.
    pub fn transform(
        &self,
        source: &Track,
        target: TargetSpec,
    ) -> impl Future<Output = Result<Track>> + Send + 'static {
        let scheduled = check_names(source, &target.name).and_then(|format| {
            let request = RunRequest::new(transform_arguments(&source.name, &target)?).with_track(source);
            self.schedule(format, request)
        });

        async move { output_track(scheduled?.await?, &target.name) }
    }

    /// Same as [`transform`](Self::transform).
    pub fn encode(
        &self,
        source: &Track,
        target: TargetSpec,
    ) -> impl Future<Output = Result<Track>> + Send + 'static {
        self.transform(source, target)
    }

    /// List the formats and codecs the engine for `format` supports.
    ///
    /// Only the engine's stdout is parsed; banners and diagnostics arrive on
    /// stderr and may interleave with the listing.
    pub fn info(
        &self,
        format: impl Into<FormatKey>,
    ) -> impl Future<Output = Result<EngineCapabilities>> + Send + 'static {
        let format = format.into();
        let formats = self.schedule(format.clone(), RunRequest::from_command_line(FORMATS_COMMAND));
        let codecs = self.schedule(format, RunRequest::from_command_line(CODECS_COMMAND));

        async move {
            let (formats, codecs) = (formats?, codecs?);
            let (formats, codecs) = tokio::join!(formats, codecs);
            Ok(EngineCapabilities {
                formats: parse_section(&formats?.stdout, FORMATS_HEADER),
                codecs: parse_section(&codecs?.stdout, CODECS_HEADER),
            })
        }
    }

    /// Probe every registered engine. Blocks while the engines run.
    pub fn check_engines(&self) -> Vec<(FormatKey, EngineInfo)> {
        self.inner
            .registry
            .iter()
            .map(|(format, locator)| (format.clone(), check_engine(&locator.program, "-version")))
            .collect()
    }

    /// Terminate every execution unit.
    pub async fn shutdown(&self) {
        self.inner.sessions.shutdown().await;
    }

    fn schedule(
        &self,
        format: FormatKey,
        request: RunRequest,
    ) -> Result<impl Future<Output = Result<RunOutput>> + Send + 'static> {
        let session = self.inner.sessions.session(&format)?;
        tracing::debug!(format = %format, args = ?request.arguments, "Scheduling run");
        Ok(self
            .inner
            .queue
            .enqueue(format, move || async move { session.run(request).await }))
    }
}

/// Validate the names used in the argument vector and resolve the source's
/// format key.
fn check_names(source: &Track, target_name: &str) -> Result<FormatKey> {
    validate_buffer_name(&source.name)?;
    validate_buffer_name(target_name)?;

    let format = if source.format.trim().is_empty() {
        FormatKey::from_name(&source.name)
    } else {
        Some(FormatKey::new(&source.format))
    };
    format
        .filter(|format| !format.is_empty())
        .ok_or_else(|| Error::unsupported_format(source.format.clone()))
}

/// Pick the file named `target_name` from a run's output, else the first.
fn output_track(output: RunOutput, target_name: &str) -> Result<Track> {
    let mut files = output.files.unwrap_or_default();
    let index = files
        .iter()
        .position(|file| file.name == target_name)
        .unwrap_or(0);

    if index < files.len() {
        Ok(Track::from(files.swap_remove(index)))
    } else {
        Err(Error::MissingOutput(target_name.to_string()))
    }
}
