//! mediabridge - ordered, per-format access to a sandboxed transcoding engine
//!
//! The [`Converter`] owns one execution unit per registered format, runs at
//! most one engine invocation per format at a time in call order, and reduces
//! each run's message stream to a single result. The [`proxy`] module relays
//! the same operations to a converter living in another context.
//!
//! ```no_run
//! use mediabridge::{BridgeConfig, Converter, DecodeOptions, Track};
//!
//! # async fn example() -> mediabridge::Result<()> {
//! let converter = Converter::new(&BridgeConfig::default())?;
//! let source = Track::from_path(std::path::Path::new("clip.webm"))?;
//! let audio = converter.decode(&source, "clip.ogg", DecodeOptions::default()).await?;
//! audio.write_to(std::path::Path::new("clip.ogg"))?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod converter;
pub mod demux;
pub mod logging;
pub mod proxy;
pub mod queue;
pub mod registry;
pub mod session;

pub use config::{BridgeConfig, EngineConfig, ProxyConfig, WorkspaceConfig};
pub use converter::{Capability, Converter, DecodeOptions, EngineCapabilities, TargetSpec};
pub use demux::{Reset, RunOutput};
pub use mediabridge_common::{Error, FormatKey, Result, Track};
pub use proxy::{ProxyConverter, ProxyHost};
pub use queue::TaskQueue;
pub use registry::FormatRegistry;
pub use session::{Session, SessionPool};
