//! Relaying converter operations across an isolated context.
//!
//! A [`ProxyConverter`] on the caller's side serializes each operation into an
//! [`ActionEnvelope`] with a fresh correlation id and posts it through a port.
//! A [`ProxyHost`] on the other side runs it on its own [`Converter`](crate::Converter)
//! and posts a [`ResponseEnvelope`] carrying the same id. Messages from any
//! origin other than the configured one are dropped.

mod client;
pub mod envelope;
mod host;
pub mod port;

pub use client::{BridgeState, ProxyConverter};
pub use envelope::{ActionEnvelope, BridgeReply, BridgeRequest, HostMessage, ResponseEnvelope};
pub use host::ProxyHost;
pub use port::{connect, CallerPort, Envelope, HostPort, Port, PortSender};
