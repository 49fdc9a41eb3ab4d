//! Connection and session (C6, §4.6).
//!
//! Owns the login handshake, the post-login dispatcher/trigger machinery,
//! and query submission. The handshake itself runs directly against a
//! [`FrameTransport`], before the dispatch multiplexer exists: it has no
//! dispatch id framing of its own (§4.6).

use crate::cache::RowCache;
use crate::conn::{ConnectParams, IntoConnectParams, Target};
use crate::config::ConnectionConfiguration;
use crate::dispatch::Dispatcher;
use crate::error::{protocol_err, HdbError, HdbResult};
use crate::lob::UploadRegistry;
use crate::trigger::{TriggerCallback, TriggerDispatch};
use crate::wire::{Command, ColumnDescription, FrameTransport, Query, QueryResponse, ResponseStatus, TcpTransport, Value};
use crate::cursor::ResultSet;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// `int32 magic` the client sends at the start of the handshake (§4.6).
const HANDSHAKE_MAGIC: i32 = 0x0CED007;
const DRIVER_VERSION_MAJOR: i32 = 1;
const DRIVER_VERSION_MINOR: i32 = 0;

/// A live connection to a database server (C6).
pub struct Connection {
    dispatcher: Arc<Dispatcher>,
    row_cache: Arc<RowCache>,
    uploads: Arc<UploadRegistry>,
    triggers: Arc<TriggerDispatch>,
    config: Mutex<ConnectionConfiguration>,
    server_version: i32,
    auto_commit: AtomicBool,
    closed: AtomicBool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("server_version", &self.server_version)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Resolves `target` to a [`ConnectParams`], dials it, and runs the login
    /// handshake (§4.6). Embedded/local targets are out of scope for this
    /// driver (§1, "the in-process embedded-server boot path").
    pub fn connect(target: impl IntoConnectParams, config: ConnectionConfiguration) -> HdbResult<Self> {
        let params = target.into_connect_params()?;
        let transport: Arc<dyn FrameTransport> = match params.target() {
            Target::Tcp { .. } => {
                let addr = params
                    .addr()
                    .expect("Target::Tcp always has an addr");
                Arc::new(TcpTransport::connect(&addr)?)
            }
            Target::Local { .. } => {
                return Err(HdbError::Unsupported(
                    "connecting to an embedded/local server is out of scope for this driver".into(),
                ))
            }
        };
        Self::handshake(transport, &params, config)
    }

    /// Runs the login handshake over an already-established transport. This
    /// is the entry point for in-process tests built on [`crate::wire::PipeTransport`].
    pub fn handshake(
        transport: Arc<dyn FrameTransport>,
        params: &ConnectParams,
        config: ConnectionConfiguration,
    ) -> HdbResult<Self> {
        let mut request = Vec::with_capacity(12);
        request.write_i32::<BigEndian>(HANDSHAKE_MAGIC)?;
        request.write_i32::<BigEndian>(DRIVER_VERSION_MAJOR)?;
        request.write_i32::<BigEndian>(DRIVER_VERSION_MINOR)?;
        transport.write_frame(&request)?;

        let reply = transport.read_frame()?;
        let mut cursor: &[u8] = &reply;
        let ack = cursor.read_i32::<BigEndian>()?;
        if ack != 5 {
            return Err(protocol_err!("handshake: expected ACK(5), got {ack}"));
        }
        let server_version = if let Ok(flag) = cursor.read_u8() {
            if flag == 1 {
                cursor.read_i32::<BigEndian>().unwrap_or(0)
            } else {
                0
            }
        } else {
            0
        };
        debug!("handshake acknowledged, server_version={server_version}");

        let mut login = Vec::new();
        write_utf_field(&mut login, params.schema().unwrap_or(""))?;
        write_utf_field(&mut login, params.user())?;
        write_utf_field(&mut login, params.password().unsecure())?;
        transport.write_frame(&login)?;

        let reply = transport.read_frame()?;
        let mut cursor: &[u8] = &reply;
        let result = cursor.read_i32::<BigEndian>()?;
        match result {
            10 => {}
            15 => return Err(HdbError::AuthenticationFailed),
            other => return Err(protocol_err!("login: unexpected result code {other}")),
        }
        debug!("login accepted for user {:?}", params.user());

        let dispatcher = Dispatcher::start(transport, config.trigger_queue_bound());
        let row_cache = Arc::new(RowCache::new(&config));
        let uploads = Arc::new(UploadRegistry::new());
        let triggers = Arc::new(TriggerDispatch::new(Arc::clone(&dispatcher)));

        let connection = Self {
            dispatcher,
            row_cache,
            uploads,
            triggers,
            config: Mutex::new(config),
            server_version,
            auto_commit: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        };
        connection.load_connection_info();
        Ok(connection)
    }

    /// Best-effort `SHOW CONNECTION_INFO` query (§4.6, "Post-login
    /// configuration"); failures here are logged, not propagated, since a
    /// server that doesn't support it can still be used with driver defaults.
    fn load_connection_info(&self) {
        match self.query("SHOW CONNECTION_INFO", Vec::new()) {
            Ok(mut rs) => {
                if rs.next().unwrap_or(false) {
                    if let Ok(flag) = rs.get_bool("CASE_INSENSITIVE") {
                        let mut config = self.config.lock().expect("config lock");
                        *config = config.clone().with_case_insensitive_columns(flag);
                    }
                    if let Ok(flag) = rs.get_bool("AUTO_COMMIT") {
                        self.auto_commit.store(flag, Ordering::Relaxed);
                    }
                }
            }
            Err(e) => debug!("SHOW CONNECTION_INFO failed, keeping driver defaults: {e}"),
        }
    }

    pub fn server_version(&self) -> i32 {
        self.server_version
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.dispatcher.is_closed()
    }

    /// Registers a byte source for later large-object upload, returning the
    /// handle to bind as a query parameter (§4.4, "Upload").
    pub fn register_upload(
        &self,
        kind: crate::wire::StreamKind,
        total_length: i64,
        source: Box<dyn std::io::Read + Send>,
    ) -> HdbResult<Value> {
        self.uploads.register(kind, total_length, source)
    }

    /// Subscribes `callback` to database events named `trigger_name` (§4.6).
    pub fn subscribe_trigger(&self, trigger_name: impl Into<String>, callback: TriggerCallback) -> HdbResult<()> {
        self.triggers.subscribe(trigger_name, callback)
    }

    pub fn unsubscribe_trigger(&self, trigger_name: &str) -> HdbResult<()> {
        self.triggers.unsubscribe(trigger_name)
    }

    /// Submits `sql` with `params`, uploading any pending streamable objects
    /// first, and returns a cursor over the result (§4.3, §4.4, §4.5).
    ///
    /// For statements with no server-side result (DDL/DML), the returned
    /// cursor has zero scrollable rows; [`ResultSet::affected_row_count`]
    /// carries the server's affected-row count instead.
    pub fn query(&self, sql: impl Into<String>, params: Vec<Value>) -> HdbResult<ResultSet> {
        if self.is_closed() {
            return Err(HdbError::ConnectionClosed);
        }
        let config = self.config.lock().expect("config lock").clone();
        crate::lob::upload_pending(&self.dispatcher, &self.uploads, &params, config.lob_chunk_size())?;

        let query = Query::with_params(sql, params);
        let mut body = Vec::new();
        query.write(&mut body)?;
        let timeout = config.query_timeout();
        let reply = self.dispatcher.submit(Command::Query, &body, timeout)?;

        let mut cursor: &[u8] = &reply;
        let status = cursor.read_i32::<BigEndian>()?;
        match ResponseStatus::try_new(status)? {
            ResponseStatus::Success => {
                let response = QueryResponse::read(&mut cursor)?;
                ResultSet::new(
                    Arc::clone(&self.dispatcher),
                    Arc::clone(&self.row_cache),
                    config,
                    response.result_id,
                    response.columns,
                    u32::try_from(response.row_count).unwrap_or(0),
                    response.warning,
                )
            }
            ResponseStatus::Exception => {
                let vendor_code = cursor.read_i32::<BigEndian>()?;
                let message = crate::wire::read_utf(&mut cursor)?;
                let stacktrace = crate::wire::read_utf(&mut cursor)?;
                Err(HdbError::Server {
                    vendor_code,
                    message,
                    stacktrace,
                })
            }
            ResponseStatus::AuthenticationError => {
                let message = crate::wire::read_utf(&mut cursor).unwrap_or_default();
                Err(HdbError::AuthorizationDenied(message))
            }
            other => Err(protocol_err!("QUERY failed with unexpected status {other:?}")),
        }
    }

    /// Convenience wrapper around [`Connection::query`] for column metadata
    /// without materialising rows, e.g. parameter/result-set introspection
    /// queries the application issues itself.
    pub fn describe(&self, sql: impl Into<String>, params: Vec<Value>) -> HdbResult<Vec<ColumnDescription>> {
        Ok(self.query(sql, params)?.columns().to_vec())
    }

    /// Best-effort `CLOSE`, then tears down the dispatcher and its reader
    /// thread (§4.6, §7 "Recovery": disposal after close is a no-op). Safe to
    /// call more than once.
    pub fn close(&self) -> HdbResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match self.dispatcher.submit(Command::Close, &[], None) {
            Ok(_) | Err(HdbError::ConnectionClosed) | Err(HdbError::Timeout) => {}
            Err(e) => debug!("CLOSE request failed: {e}"),
        }
        self.dispatcher.close()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn write_utf_field<W: std::io::Write>(w: &mut W, s: &str) -> HdbResult<()> {
    let bytes = s.as_bytes();
    w.write_u16::<BigEndian>(u16::try_from(bytes.len()).map_err(|_| {
        protocol_err!("UTF field too long ({} bytes)", bytes.len())
    })?)?;
    w.write_all(bytes)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::PipeTransport;
    use std::io::Read;

    fn handshake_server(server_side: PipeTransport) -> std::thread::JoinHandle<PipeTransport> {
        std::thread::spawn(move || {
            let frame = server_side.read_frame().unwrap();
            let mut cursor: &[u8] = &frame;
            let magic = cursor.read_i32::<BigEndian>().unwrap();
            assert_eq!(magic, HANDSHAKE_MAGIC);

            let mut ack = Vec::new();
            ack.write_i32::<BigEndian>(5).unwrap();
            ack.write_u8(1).unwrap();
            ack.write_i32::<BigEndian>(92).unwrap();
            server_side.write_frame(&ack).unwrap();

            let login = server_side.read_frame().unwrap();
            let mut cursor: &[u8] = &login;
            for _ in 0..3 {
                let len = cursor.read_u16::<BigEndian>().unwrap();
                let mut buf = vec![0u8; usize::from(len)];
                cursor.read_exact(&mut buf).unwrap();
            }
            let mut passed = Vec::new();
            passed.write_i32::<BigEndian>(10).unwrap();
            server_side.write_frame(&passed).unwrap();
            server_side
        })
    }

    #[test]
    fn handshake_completes_and_starts_dispatcher() {
        let (client_side, server_side) = PipeTransport::pair();
        let server = handshake_server(server_side);
        let params = ConnectParams::builder()
            .hostname("unused")
            .user("alice")
            .password("s3cret")
            .build()
            .unwrap();

        let server_side = server.join().unwrap();
        std::thread::spawn(move || {
            // answer SHOW CONNECTION_INFO with an empty result so load_connection_info
            // doesn't hang waiting for a reply it will never get.
            let frame = match server_side.read_frame() {
                Ok(f) => f,
                Err(_) => return,
            };
            let mut cursor: &[u8] = &frame;
            let _command = cursor.read_i32::<BigEndian>().unwrap();
            let dispatch_id = cursor.read_i32::<BigEndian>().unwrap();
            let mut reply = Vec::new();
            reply.write_i32::<BigEndian>(dispatch_id).unwrap();
            reply.write_i32::<BigEndian>(20).unwrap();
            reply.write_i32::<BigEndian>(-1).unwrap();
            reply.write_i32::<BigEndian>(0).unwrap();
            reply.write_i32::<BigEndian>(0).unwrap();
            reply.write_i32::<BigEndian>(0).unwrap();
            let _ = server_side.write_frame(&reply);
        });

        let connection =
            Connection::handshake(Arc::new(client_side), &params, ConnectionConfiguration::default()).unwrap();
        assert_eq!(connection.server_version(), 92);
        assert!(!connection.is_closed());
    }
}
