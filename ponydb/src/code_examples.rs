//! Code examples.
//!
//! # 1. Connecting
//!
//! A connection is established from a `jdbc:pony://` URL (see also
//! [`ConnectParams`]) plus a [`ConnectionConfiguration`]:
//!
//! ```rust,no_run
//! use ponydb::{Connection, ConnectionConfiguration};
//! # use ponydb::HdbResult;
//! # fn foo() -> HdbResult<()> {
//! let connection = Connection::connect(
//!     "jdbc:pony://my_host:9157/my_schema?user=alice&password=s3cret",
//!     ConnectionConfiguration::default(),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! The configuration controls fetch size, row cache limits, small-result
//! inlining, and large-object chunk size:
//!
//! ```rust,no_run
//! use ponydb::ConnectionConfiguration;
//!
//! let config = ConnectionConfiguration::default()
//!     .with_fetch_size(100)
//!     .with_row_cache_capacity(50_000)
//!     .with_small_result_inlining(false);
//! ```
//!
//! # 2. Queries and scrollable iteration
//!
//! [`Connection::query`] sends SQL with positional parameters and returns a
//! [`ResultSet`], a scrollable cursor positioned before the first row:
//!
//! ```rust,no_run
//! # use ponydb::{Connection, ConnectionConfiguration, HdbResult, Value};
//! # fn foo() -> HdbResult<()> {
//! # let connection = Connection::connect("...", ConnectionConfiguration::default())?;
//! let mut result_set = connection.query(
//!     "SELECT name, age FROM people WHERE age > ?",
//!     vec![Value::Int(18)],
//! )?;
//! while result_set.next()? {
//!     let name = result_set.get_string("name")?;
//!     let age = result_set.get_i32("age")?;
//!     println!("{name:?} is {age}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Unlike a forward-only iterator, a [`ResultSet`] can also be driven
//! backwards or to an absolute position; this is handy for paging through
//! a large result from either end:
//!
//! ```rust,no_run
//! # use ponydb::{Connection, ConnectionConfiguration, HdbResult};
//! # fn foo() -> HdbResult<()> {
//! # let connection = Connection::connect("...", ConnectionConfiguration::default())?;
//! let mut result_set = connection.query("SELECT id FROM big_table", vec![])?;
//! result_set.last()?;
//! while result_set.previous()? {
//!     let id = result_set.get_i64("id")?;
//!     # let _ = id;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Statements without a scrollable result (DDL/DML) still return a
//! [`ResultSet`], but with zero rows; use
//! [`ResultSet::affected_row_count`] instead:
//!
//! ```rust,no_run
//! # use ponydb::{Connection, ConnectionConfiguration, HdbResult};
//! # fn foo() -> HdbResult<()> {
//! # let connection = Connection::connect("...", ConnectionConfiguration::default())?;
//! let result_set = connection.query("DELETE FROM people WHERE age < 0", vec![])?;
//! println!("deleted {} rows", result_set.affected_row_count());
//! # Ok(())
//! # }
//! ```
//!
//! # 3. Typed cell access
//!
//! Cells are read through a small family of `get_*` methods, addressed by
//! column name (case-insensitively by default, see
//! [`ConnectionConfiguration::with_case_insensitive_columns`]):
//!
//! ```rust,no_run
//! # use ponydb::{Connection, ConnectionConfiguration, HdbResult};
//! # fn foo() -> HdbResult<()> {
//! # let connection = Connection::connect("...", ConnectionConfiguration::default())?;
//! let mut result_set = connection.query("SELECT * FROM invoices", vec![])?;
//! while result_set.next()? {
//! # #[allow(unused_variables)]
//!     let id: i64 = result_set.get_i64("id")?;
//! # #[allow(unused_variables)]
//!     let total: f64 = result_set.get_f64("total")?;
//! # #[allow(unused_variables)]
//!     let paid: bool = result_set.get_bool("paid")?;
//! # #[allow(unused_variables)]
//!     let note: Option<String> = result_set.get_string("note")?;
//!     if result_set.was_null() {
//!         // `note` above is `None`; `was_null()` reflects the most recently
//!         // read cell regardless of which `get_*` method read it.
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # 4. Large objects
//!
//! ## 4.1 Reading
//!
//! A binary or character column may resolve to a streamable object rather
//! than an inline value; [`ResultSet::get_binary_reader`] and
//! [`ResultSet::get_character_reader`] hide that distinction behind a plain
//! [`std::io::Read`] that fetches further chunks from the server on demand:
//!
//! ```rust,no_run
//! # use ponydb::{Connection, ConnectionConfiguration, HdbResult};
//! # fn foo() -> HdbResult<()> {
//! # let connection = Connection::connect("...", ConnectionConfiguration::default())?;
//! let mut result_set = connection.query("SELECT photo FROM people WHERE id = ?", vec![])?;
//! result_set.next()?;
//! if let Some(mut reader) = result_set.get_binary_reader("photo")? {
//!     let mut buf = Vec::new();
//!     std::io::Read::read_to_end(&mut reader, &mut buf)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## 4.2 Writing
//!
//! To send a large object as a query parameter, register the byte source
//! with [`Connection::register_upload`] first; the returned [`Value`] is
//! then bound like any other parameter, and the bytes are streamed up in
//! chunks as part of sending the query:
//!
//! ```rust,no_run
//! # use ponydb::{Connection, ConnectionConfiguration, HdbResult, StreamKind};
//! # fn foo() -> HdbResult<()> {
//! # let connection = Connection::connect("...", ConnectionConfiguration::default())?;
//! let data = std::fs::File::open("photo.png")?;
//! let len = data.metadata()?.len() as i64;
//! let handle = connection.register_upload(StreamKind::Binary, len, Box::new(data))?;
//! connection.query(
//!     "UPDATE people SET photo = ? WHERE id = ?",
//!     vec![handle, ponydb::Value::Int(42)],
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! # 5. Triggers
//!
//! A connection can subscribe to server-pushed events without polling;
//! callbacks run on a dedicated background thread and are isolated from
//! each other (a panicking callback is caught and logged, not propagated):
//!
//! ```rust,no_run
//! # use ponydb::{Connection, ConnectionConfiguration, HdbResult};
//! # fn foo() -> HdbResult<()> {
//! # let connection = Connection::connect("...", ConnectionConfiguration::default())?;
//! connection.subscribe_trigger(
//!     "orders_changed",
//!     Box::new(|event| {
//!         println!("{} fired {} time(s), source={}", event.name, event.fire_count, event.source);
//!     }),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! # 6. Typed row deserialization
//!
//! For straight-line projections onto an application struct,
//! [`ResultSet::try_into`] drives the remaining rows through `serde` instead
//! of a manual `get_*` loop:
//!
//! ```rust,no_run
//! # use ponydb::{Connection, ConnectionConfiguration, HdbResult};
//! #[derive(serde::Deserialize)]
//! struct Person {
//!     name: String,
//!     age: i32,
//! }
//! # fn foo() -> HdbResult<()> {
//! # let connection = Connection::connect("...", ConnectionConfiguration::default())?;
//! let result_set = connection.query("SELECT name, age FROM people", vec![])?;
//! let people: Vec<Person> = result_set.try_into()?;
//! # let _ = people;
//! # Ok(())
//! # }
//! ```
//!
//! # 7. Connection pooling
//!
//! With the `r2d2_pool` feature enabled, [`pool::ConnectionManager`]
//! implements [`r2d2::ManageConnection`] directly against [`Connection`]:
//!
//! ```rust,ignore
//! use ponydb::pool::ConnectionManager;
//! use ponydb::{ConnectParams, ConnectionConfiguration};
//!
//! let params = ConnectParams::builder()
//!     .hostname("my_host")
//!     .port(9157)
//!     .user("alice")
//!     .password("s3cret")
//!     .build()?;
//! let manager = ConnectionManager::new(params, ConnectionConfiguration::default());
//! let pool = r2d2::Pool::builder().max_size(10).build(manager)?;
//!
//! let connection = pool.get()?;
//! let _result_set = connection.query("SELECT 1 FROM dual", vec![])?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`Connection`]: crate::Connection
//! [`Connection::query`]: crate::Connection::query
//! [`Connection::register_upload`]: crate::Connection::register_upload
//! [`ConnectParams`]: crate::ConnectParams
//! [`ConnectionConfiguration`]: crate::ConnectionConfiguration
//! [`ConnectionConfiguration::with_case_insensitive_columns`]: crate::ConnectionConfiguration::with_case_insensitive_columns
//! [`ResultSet`]: crate::ResultSet
//! [`ResultSet::affected_row_count`]: crate::ResultSet::affected_row_count
//! [`ResultSet::get_binary_reader`]: crate::ResultSet::get_binary_reader
//! [`ResultSet::get_character_reader`]: crate::ResultSet::get_character_reader
//! [`Value`]: crate::Value
