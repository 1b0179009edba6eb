//! mediabridge-common: shared types, errors, and utilities.
//!
//! This crate provides the pieces used on both sides of the bridge:
//!
//! - **Errors**: the unified [`Error`] taxonomy and [`Result`] alias
//! - **Typed IDs**: [`CorrelationId`] for bridge envelopes, [`UnitId`] for
//!   execution units
//! - **Format keys**: [`FormatKey`] normalization and extension helpers
//! - **Tracks**: the [`Track`] value object wrapping a named binary payload
//! - **Lines**: splitting accumulated engine output into lines
//!
//! # Examples
//!
//! ```
//! use mediabridge_common::{FormatKey, Track};
//!
//! let track = Track::new("clip.webm", Vec::new());
//! assert_eq!(FormatKey::new(&track.format), FormatKey::new("webm"));
//! ```

pub mod error;
pub mod format;
pub mod ids;
pub mod lines;
pub mod track;

pub use error::{Error, Result};
pub use format::FormatKey;
pub use ids::*;
pub use track::{Blob, Track};
