//! # mediabridge-engine
//!
//! Execution units and the message protocol for the transcoding engine.
//!
//! This crate provides:
//!
//! - **Protocol** ([`RunRequest`], [`EngineMessage`]) -- what goes into a unit
//!   and what comes back out.
//! - **Unit abstraction** ([`ExecutionUnit`], [`UnitFactory`]) -- an isolated
//!   worker with a fresh message channel per run.
//! - **Process units** ([`CommandUnit`], [`CommandUnitFactory`]) -- run the
//!   engine executable as a child process inside a scratch [`Workspace`].
//! - **Engine discovery** ([`check_engine`], [`resolve_engine`]).
//! - **Scripted units** ([`scripted::ScriptedFactory`]) -- replay canned
//!   message sequences instead of running an engine.

pub mod command;
pub mod protocol;
pub mod scripted;
pub mod tools;
pub mod unit;
pub mod workspace;

pub use command::{CommandUnit, CommandUnitFactory};
pub use protocol::{
    EngineMessage, EngineResult, FsKind, Mount, MountOptions, NamedBuffer, RunRequest,
    WORKERFS_DIRECTORY,
};
pub use tools::{check_engine, resolve_engine, EngineInfo};
pub use unit::{
    message_channel, EngineLocator, ExecutionUnit, MessageSink, MessageStream, UnitEvent,
    UnitFactory,
};
pub use workspace::Workspace;
