//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], a [`Converter`] backed by scripted execution
//! units, and [`BridgeHarness`], the same converter served through a
//! [`ProxyHost`] and driven by a [`ProxyConverter`] over in-memory ports.

#![allow(dead_code)]

use std::sync::Arc;

use mediabridge::proxy::{connect, ProxyConverter, ProxyHost};
use mediabridge::{Converter, FormatKey, FormatRegistry, ProxyConfig};
use mediabridge_engine::scripted::{ScriptedFactory, Step};
use mediabridge_engine::{EngineLocator, NamedBuffer, RunRequest};

pub const CALLER_ORIGIN: &str = "https://app.example.com";
pub const HOST_ORIGIN: &str = "https://converter.example.com";

/// Default script, driven by the request's arguments:
///
/// - `crash` replies with an engine `error`,
/// - `fail=<code>` exits with `code`,
/// - `delay=<ms>` sleeps before finishing,
/// - otherwise echoes the arguments on stdout and returns a file named
///   after the last argument containing the joined arguments.
pub fn scripted_engine(request: &RunRequest) -> Vec<Step> {
    let mut steps = Vec::new();
    let joined = request.arguments.join(" ");

    for arg in &request.arguments {
        if arg == "crash" {
            return vec![Step::stderr("engine aborted"), Step::error("engine aborted")];
        }
        if let Some(code) = arg.strip_prefix("fail=") {
            return vec![Step::exit(code.parse().unwrap_or(1))];
        }
        if let Some(ms) = arg.strip_prefix("delay=") {
            steps.push(Step::sleep_ms(ms.parse().unwrap_or(0)));
        }
    }

    let target = request.arguments.last().cloned().unwrap_or_default();
    steps.push(Step::stdout(joined.clone()));
    steps.push(Step::done(vec![NamedBuffer::new(target, joined.into_bytes())]));
    steps
}

pub fn registry() -> FormatRegistry {
    FormatRegistry::from_entries([
        ("webm", EngineLocator::new("ffmpeg-webm")),
        ("mp4", EngineLocator::new("ffmpeg-mp4")),
    ])
    .unwrap()
}

/// A converter whose units are scripted.
pub struct TestHarness {
    pub converter: Converter,
    pub factory: ScriptedFactory,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_script(scripted_engine)
    }

    pub fn with_script<F>(script: F) -> Self
    where
        F: Fn(&RunRequest) -> Vec<Step> + Send + Sync + 'static,
    {
        let factory = ScriptedFactory::new(script);
        let converter = Converter::with_factory(registry(), Arc::new(factory.clone()));
        Self { converter, factory }
    }

    /// Arguments of every issued run on `format`, in issue order.
    pub fn issued(&self, format: &str) -> Vec<String> {
        let format = FormatKey::new(format);
        self.factory
            .runs()
            .into_iter()
            .filter(|run| run.format == format)
            .map(|run| run.request.arguments.join(" "))
            .collect()
    }
}

/// A scripted converter reachable only through the bridge.
pub struct BridgeHarness {
    pub proxy: ProxyConverter,
    pub factory: ScriptedFactory,
}

impl BridgeHarness {
    pub fn new() -> Self {
        let harness = TestHarness::new();
        let (caller, host) = connect(CALLER_ORIGIN, HOST_ORIGIN, 64);

        ProxyHost::new(harness.converter, host)
            .with_caller_origin(CALLER_ORIGIN)
            .spawn();

        let config = ProxyConfig {
            origin: HOST_ORIGIN.to_string(),
            ..ProxyConfig::default()
        };
        Self {
            proxy: ProxyConverter::new(&config, caller),
            factory: harness.factory,
        }
    }
}
