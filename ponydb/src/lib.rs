//! Synchronous native Rust client driver for the pony relational database
//! wire protocol.
//!
//! `ponydb` multiplexes many outstanding requests over a single connection to
//! a pony server, transfers strongly-typed SQL cell values (including large
//! binary/character objects) in both directions, and exposes a scrollable
//! result cursor with local row caching so that a forward or backward scan
//! over a result rarely needs more than one round trip per block of rows.
//!
//! ```rust,no_run
//! use ponydb::{Connection, ConnectionConfiguration, Value};
//!
//! # fn main() -> ponydb::HdbResult<()> {
//! let connection = Connection::connect(
//!     "jdbc:pony://localhost:9157/my_schema?user=alice&password=s3cret",
//!     ConnectionConfiguration::default(),
//! )?;
//!
//! let mut result_set = connection.query(
//!     "SELECT name, age FROM people WHERE age > ?",
//!     vec![Value::Int(18)],
//! )?;
//! while result_set.next()? {
//!     let name = result_set.get_string("name")?;
//!     let age = result_set.get_i32("age")?;
//!     println!("{name:?} is {age}");
//! }
//! # Ok(()) }
//! ```
//!
//! See [`code_examples`] for a broader tour: scrollable positioning, large
//! objects, triggers, and connection pooling.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_debug_implementations)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub use ponydb_impl::{
    AsciiLobReader, ClobReader, ColumnDescription, ConnectParams, ConnectParamsBuilder,
    Connection, ConnectionConfiguration, Decimal, Event, HdbError, HdbResult, InternalType,
    IntoConnectParams, LobReader, ResultSet, StreamKind, Target, TriggerCallback, TriggerEvent,
    Value, DEFAULT_CACHE_ADMISSION_THRESHOLD, DEFAULT_FETCH_SIZE, DEFAULT_INLINE_THRESHOLD,
    DEFAULT_LOB_CHUNK_SIZE, DEFAULT_PORT, MAX_FETCH_SIZE,
};

/// Connection pooling with [`r2d2`](https://docs.rs/r2d2), gated behind the
/// `r2d2_pool` feature.
#[cfg_attr(docsrs, doc(cfg(feature = "r2d2_pool")))]
#[cfg(feature = "r2d2_pool")]
pub mod pool {
    pub use ponydb_impl::pool::ConnectionManager;
}

pub mod code_examples;

/// Building blocks for driving a fake server from integration tests: a
/// pipe-pair transport and the wire-level enums needed to speak the
/// protocol without a real TCP server.
pub mod testing {
    pub use ponydb_impl::testing::{Command, FrameTransport, PipeTransport, ResponseStatus};
}
