//! Do not use this crate directly.
//!
//! This is the implementation crate for `ponydb`. Application code should
//! depend on `ponydb` instead; this crate carries the wire protocol, dispatch
//! multiplexer, large-object channel, row cache and cursor, and the
//! connection/session machinery that `ponydb` wraps in a stable public API.

#![deny(missing_debug_implementations)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

#[macro_use]
extern crate log;

mod cache;
mod conn;
mod config;
mod connection;
mod cursor;
mod dispatch;
mod error;
mod lob;
mod rows;
mod trigger;
mod wire;

#[cfg(feature = "r2d2_pool")]
pub mod pool;

pub use crate::cache::RowCache;
pub use crate::conn::{ConnectParams, ConnectParamsBuilder, DEFAULT_PORT, IntoConnectParams, Target};
pub use crate::config::{
    ConnectionConfiguration, DEFAULT_CACHE_ADMISSION_THRESHOLD, DEFAULT_FETCH_SIZE,
    DEFAULT_INLINE_THRESHOLD, DEFAULT_LOB_CHUNK_SIZE, MAX_FETCH_SIZE,
};
pub use crate::connection::Connection;
pub use crate::cursor::ResultSet;
pub use crate::dispatch::Event;
pub use crate::error::{HdbError, HdbResult};
pub use crate::lob::{AsciiLobReader, ClobReader, LobReader, UploadRegistry};
pub use crate::trigger::{TriggerCallback, TriggerEvent};
pub use crate::wire::{ColumnDescription, Decimal, InternalType, StreamKind, Value};

/// Building blocks for driving a fake server from integration tests: a
/// pipe-pair transport (§4.2b) and the wire-level enums needed to speak the
/// protocol of §6 without going through a real TCP server.
pub mod testing {
    pub use crate::wire::{Command, FrameTransport, PipeTransport, ResponseStatus};
}
