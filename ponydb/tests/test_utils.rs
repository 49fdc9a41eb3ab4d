// shared by every integration test below; not all tests use every function.
#![allow(dead_code)]

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use ponydb::testing::{Command, FrameTransport, PipeTransport, ResponseStatus};
use ponydb::{
    ColumnDescription, ConnectParams, Connection, ConnectionConfiguration, InternalType,
    StreamKind, Value,
};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

const HANDSHAKE_MAGIC: i32 = 0x0CED007;

/// What a stub query handler hands back for one SQL statement.
pub enum Outcome {
    Rows {
        columns: Vec<ColumnDescription>,
        rows: Vec<Vec<Value>>,
    },
    Affected(i32),
    Exception { vendor_code: i32, message: String },
}

impl Outcome {
    pub fn rows(columns: Vec<ColumnDescription>, rows: Vec<Vec<Value>>) -> Self {
        Self::Rows { columns, rows }
    }
}

/// A minimal `VARCHAR`-ish column description, the shape most stub rows need.
pub fn string_column(name: &str) -> ColumnDescription {
    ColumnDescription {
        name: name.to_string(),
        internal_type: InternalType::String,
        sql_type: 0,
        size: -1,
        scale: -1,
        not_null: false,
        unique: false,
        unique_group: -1,
    }
}

pub fn int_column(name: &str) -> ColumnDescription {
    ColumnDescription {
        name: name.to_string(),
        internal_type: InternalType::Numeric,
        sql_type: 1,
        size: 10,
        scale: 0,
        not_null: false,
        unique: false,
        unique_group: -1,
    }
}

pub fn bool_column(name: &str) -> ColumnDescription {
    ColumnDescription {
        name: name.to_string(),
        internal_type: InternalType::Boolean,
        sql_type: 2,
        size: 1,
        scale: -1,
        not_null: false,
        unique: false,
        unique_group: -1,
    }
}

pub fn bytes_column(name: &str) -> ColumnDescription {
    ColumnDescription {
        name: name.to_string(),
        internal_type: InternalType::Binary,
        sql_type: 3,
        size: -1,
        scale: -1,
        not_null: false,
        unique: false,
        unique_group: -1,
    }
}

pub fn lob_column(name: &str, large_binary: bool) -> ColumnDescription {
    ColumnDescription {
        name: name.to_string(),
        internal_type: if large_binary {
            InternalType::LargeBinary
        } else {
            InternalType::GenericObject
        },
        sql_type: if large_binary { 5 } else { 6 },
        size: -1,
        scale: -1,
        not_null: false,
        unique: false,
        unique_group: -1,
    }
}

fn write_column(out: &mut Vec<u8>, c: &ColumnDescription) {
    write_utf(out, &c.name);
    out.write_i32::<BigEndian>(c.internal_type as i32).unwrap();
    out.write_i32::<BigEndian>(c.size).unwrap();
    out.write_u8(u8::from(c.not_null)).unwrap();
    out.write_u8(u8::from(c.unique)).unwrap();
    out.write_i32::<BigEndian>(c.unique_group).unwrap();
    out.write_i32::<BigEndian>(c.sql_type).unwrap();
    out.write_i32::<BigEndian>(c.scale).unwrap();
}

struct ServerResult {
    columns: Vec<ColumnDescription>,
    rows: Vec<Vec<Value>>,
}

/// Activity the stub server records for later assertions: push-part counts
/// and the bytes collected for each uploaded streamable object id.
#[derive(Default)]
pub struct LobActivity {
    pub push_part_count: usize,
    pub uploaded_bytes: HashMap<i64, Vec<u8>>,
}

/// Drives one [`FrameTransport`] side as a stand-in server: handshake, login,
/// `SHOW CONNECTION_INFO`, then an application-supplied query handler for
/// everything else. Good enough to exercise the client end to end without a
/// real database server, whether the transport is an in-memory pipe or a
/// real TCP socket.
pub struct FakeServer {
    transport: Arc<dyn FrameTransport>,
    accept_password: Option<String>,
    results: HashMap<i32, ServerResult>,
    next_result_id: i32,
    downloads: HashMap<i64, Vec<u8>>,
    next_obj_id: i64,
    activity: Arc<Mutex<LobActivity>>,
}

impl FakeServer {
    fn new(
        transport: Arc<dyn FrameTransport>,
        accept_password: Option<String>,
        activity: Arc<Mutex<LobActivity>>,
    ) -> Self {
        Self {
            transport,
            accept_password,
            results: HashMap::new(),
            next_result_id: 1,
            downloads: HashMap::new(),
            next_obj_id: 1,
            activity,
        }
    }

    /// The underlying transport, for sending a server-initiated event
    /// (dispatch id -1) independently of the request/response loop.
    pub fn transport_handle(&self) -> Arc<dyn FrameTransport> {
        Arc::clone(&self.transport)
    }

    /// Registers bytes as a downloadable streamable object and returns the
    /// handle value to embed in a row.
    pub fn register_download(&mut self, kind: StreamKind, bytes: Vec<u8>) -> Value {
        let id = self.next_obj_id;
        self.next_obj_id += 1;
        let size = bytes.len() as i64;
        self.downloads.insert(id, bytes);
        Value::StreamableHandle { kind, size, id }
    }

    fn run(mut self, mut handler: impl FnMut(&mut FakeServer, &str, &[Value]) -> Outcome) {
        if !self.handshake_and_login() {
            return;
        }
        loop {
            let frame = match self.transport.read_frame() {
                Ok(f) => f,
                Err(_) => return,
            };
            let mut cursor: &[u8] = &frame;
            let Ok(command) = cursor.read_i32::<BigEndian>() else {
                return;
            };
            let Ok(dispatch_id) = cursor.read_i32::<BigEndian>() else {
                return;
            };

            if command == Command::Query as i32 {
                self.handle_query(dispatch_id, cursor, &mut handler);
            } else if command == Command::ResultSection as i32 {
                self.handle_result_section(dispatch_id, cursor);
            } else if command == Command::DisposeResult as i32 {
                self.handle_dispose_result(dispatch_id, cursor);
            } else if command == Command::PushStreamableObjectPart as i32 {
                self.handle_push_part(dispatch_id, cursor);
            } else if command == Command::StreamableObjectSection as i32 {
                self.handle_streamable_section(dispatch_id, cursor);
            } else if command == Command::DisposeStreamableObject as i32 {
                self.handle_dispose_streamable(dispatch_id, cursor);
            } else if command == Command::Close as i32 {
                let mut reply = Vec::new();
                reply.write_i32::<BigEndian>(dispatch_id).unwrap();
                reply
                    .write_i32::<BigEndian>(ResponseStatus::Success as i32)
                    .unwrap();
                let _ = self.transport.write_frame(&reply);
                return;
            } else if command == Command::Ping as i32 {
                let mut reply = Vec::new();
                reply.write_i32::<BigEndian>(dispatch_id).unwrap();
                reply
                    .write_i32::<BigEndian>(ResponseStatus::Success as i32)
                    .unwrap();
                let _ = self.transport.write_frame(&reply);
            }
        }
    }

    fn handshake_and_login(&mut self) -> bool {
        let Ok(frame) = self.transport.read_frame() else {
            return false;
        };
        let mut cursor: &[u8] = &frame;
        let Ok(magic) = cursor.read_i32::<BigEndian>() else {
            return false;
        };
        assert_eq!(magic, HANDSHAKE_MAGIC);

        let mut ack = Vec::new();
        ack.write_i32::<BigEndian>(5).unwrap();
        ack.write_u8(1).unwrap();
        ack.write_i32::<BigEndian>(1).unwrap();
        if self.transport.write_frame(&ack).is_err() {
            return false;
        }

        let Ok(login) = self.transport.read_frame() else {
            return false;
        };
        let mut cursor: &[u8] = &login;
        let _schema = read_utf(&mut cursor);
        let _user = read_utf(&mut cursor);
        let password = read_utf(&mut cursor);

        let accepted = match &self.accept_password {
            None => true,
            Some(expected) => password.as_deref() == Ok(expected.as_str()),
        };
        let mut reply = Vec::new();
        reply
            .write_i32::<BigEndian>(if accepted { 10 } else { 15 })
            .unwrap();
        let _ = self.transport.write_frame(&reply);
        accepted
    }

    fn handle_query(
        &mut self,
        dispatch_id: i32,
        mut body: &[u8],
        handler: &mut impl FnMut(&mut FakeServer, &str, &[Value]) -> Outcome,
    ) {
        let Ok(sql) = read_utf(&mut body) else { return };
        let params = {
            let Ok(count) = body.read_i32::<BigEndian>() else {
                return;
            };
            let mut params = Vec::with_capacity(count.max(0) as usize);
            for _ in 0..count {
                let Ok(v) = Value::decode(&mut body) else {
                    return;
                };
                params.push(v);
            }
            params
        };

        let outcome = if sql == "SHOW CONNECTION_INFO" {
            Outcome::rows(vec![], vec![])
        } else {
            handler(self, &sql, &params)
        };

        let mut reply = Vec::new();
        reply.write_i32::<BigEndian>(dispatch_id).unwrap();
        match outcome {
            Outcome::Rows { columns, rows } => {
                reply
                    .write_i32::<BigEndian>(ResponseStatus::Success as i32)
                    .unwrap();
                let result_id = self.next_result_id;
                self.next_result_id += 1;
                let row_count = rows.len() as i32;
                reply.write_i32::<BigEndian>(result_id).unwrap();
                reply.write_i32::<BigEndian>(0).unwrap(); // query_time_ms
                reply.write_i32::<BigEndian>(row_count).unwrap();
                reply.write_i32::<BigEndian>(columns.len() as i32).unwrap();
                for c in &columns {
                    write_column(&mut reply, c);
                }
                self.results
                    .insert(result_id, ServerResult { columns, rows });
            }
            Outcome::Affected(n) => {
                reply
                    .write_i32::<BigEndian>(ResponseStatus::Success as i32)
                    .unwrap();
                reply.write_i32::<BigEndian>(-1).unwrap(); // no server-side result
                reply.write_i32::<BigEndian>(0).unwrap();
                reply.write_i32::<BigEndian>(n).unwrap();
                reply.write_i32::<BigEndian>(0).unwrap(); // no columns
            }
            Outcome::Exception {
                vendor_code,
                message,
            } => {
                reply
                    .write_i32::<BigEndian>(ResponseStatus::Exception as i32)
                    .unwrap();
                reply.write_i32::<BigEndian>(vendor_code).unwrap();
                write_utf(&mut reply, &message);
                write_utf(&mut reply, "");
            }
        }
        let _ = self.transport.write_frame(&reply);
    }

    fn handle_result_section(&mut self, dispatch_id: i32, mut body: &[u8]) {
        let result_id = body.read_i32::<BigEndian>().unwrap_or(-1);
        let start = body.read_i32::<BigEndian>().unwrap_or(0).max(0) as usize;
        let count = body.read_i32::<BigEndian>().unwrap_or(0).max(0) as usize;

        let mut reply = Vec::new();
        reply.write_i32::<BigEndian>(dispatch_id).unwrap();
        let Some(result) = self.results.get(&result_id) else {
            reply
                .write_i32::<BigEndian>(ResponseStatus::Exception as i32)
                .unwrap();
            reply.write_i32::<BigEndian>(0).unwrap();
            write_utf(&mut reply, "unknown result id");
            write_utf(&mut reply, "");
            let _ = self.transport.write_frame(&reply);
            return;
        };
        reply
            .write_i32::<BigEndian>(ResponseStatus::Success as i32)
            .unwrap();
        reply
            .write_i32::<BigEndian>(result.columns.len() as i32)
            .unwrap();
        for idx in start..(start + count).min(result.rows.len()) {
            for v in &result.rows[idx] {
                v.encode(&mut reply).unwrap();
            }
        }
        let _ = self.transport.write_frame(&reply);
    }

    fn handle_dispose_result(&mut self, dispatch_id: i32, mut body: &[u8]) {
        let result_id = body.read_i32::<BigEndian>().unwrap_or(-1);
        self.results.remove(&result_id);
        let mut reply = Vec::new();
        reply.write_i32::<BigEndian>(dispatch_id).unwrap();
        reply
            .write_i32::<BigEndian>(ResponseStatus::Success as i32)
            .unwrap();
        let _ = self.transport.write_frame(&reply);
    }

    fn handle_push_part(&mut self, dispatch_id: i32, mut body: &[u8]) {
        let kind = body.read_u8().unwrap_or(2);
        let id = body.read_i64::<BigEndian>().unwrap_or(0);
        let _total_length = body.read_i64::<BigEndian>().unwrap_or(0);
        let len = body.read_i32::<BigEndian>().unwrap_or(0).max(0) as usize;
        let mut chunk = vec![0u8; len];
        let _ = body.read_exact(&mut chunk);
        let _offset = body.read_i64::<BigEndian>().unwrap_or(0);
        let _ = kind;

        if let Ok(mut activity) = self.activity.lock() {
            activity.push_part_count += 1;
            activity
                .uploaded_bytes
                .entry(id)
                .or_default()
                .extend_from_slice(&chunk);
        }

        let mut reply = Vec::new();
        reply.write_i32::<BigEndian>(dispatch_id).unwrap();
        reply
            .write_i32::<BigEndian>(ResponseStatus::Success as i32)
            .unwrap();
        let _ = self.transport.write_frame(&reply);
    }

    fn handle_streamable_section(&mut self, dispatch_id: i32, mut body: &[u8]) {
        let _result_id = body.read_i32::<BigEndian>().unwrap_or(-1);
        let obj_id = body.read_i64::<BigEndian>().unwrap_or(-1);
        let offset = body.read_i64::<BigEndian>().unwrap_or(0).max(0) as usize;
        let want = body.read_i32::<BigEndian>().unwrap_or(0).max(0) as usize;

        let mut reply = Vec::new();
        reply.write_i32::<BigEndian>(dispatch_id).unwrap();
        let Some(bytes) = self.downloads.get(&obj_id) else {
            reply
                .write_i32::<BigEndian>(ResponseStatus::Exception as i32)
                .unwrap();
            reply.write_i32::<BigEndian>(0).unwrap();
            write_utf(&mut reply, "unknown streamable object");
            write_utf(&mut reply, "");
            let _ = self.transport.write_frame(&reply);
            return;
        };
        let end = (offset + want).min(bytes.len());
        let slice = if offset < bytes.len() {
            &bytes[offset..end]
        } else {
            &[]
        };
        reply
            .write_i32::<BigEndian>(ResponseStatus::Success as i32)
            .unwrap();
        reply.write_i32::<BigEndian>(slice.len() as i32).unwrap();
        reply.write_all(slice).unwrap();
        let _ = self.transport.write_frame(&reply);
    }

    fn handle_dispose_streamable(&mut self, dispatch_id: i32, mut body: &[u8]) {
        let _result_id = body.read_i32::<BigEndian>().unwrap_or(-1);
        let obj_id = body.read_i64::<BigEndian>().unwrap_or(-1);
        self.downloads.remove(&obj_id);
        let mut reply = Vec::new();
        reply.write_i32::<BigEndian>(dispatch_id).unwrap();
        reply
            .write_i32::<BigEndian>(ResponseStatus::Success as i32)
            .unwrap();
        let _ = self.transport.write_frame(&reply);
    }
}

fn read_utf(cursor: &mut &[u8]) -> std::io::Result<String> {
    let len = cursor.read_u16::<BigEndian>()?;
    let mut buf = vec![0u8; usize::from(len)];
    cursor.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn write_utf(out: &mut Vec<u8>, s: &str) {
    out.write_u16::<BigEndian>(s.len() as u16).unwrap();
    out.write_all(s.as_bytes()).unwrap();
}

/// Connects a [`Connection`] to a stub server running `handler` on a
/// background thread, with no special login enforcement.
pub fn connect_with_handler(
    handler: impl FnMut(&mut FakeServer, &str, &[Value]) -> Outcome + Send + 'static,
) -> (Connection, JoinHandle<()>) {
    connect_with(None, ConnectionConfiguration::default(), handler)
}

pub fn connect_with_config(
    config: ConnectionConfiguration,
    handler: impl FnMut(&mut FakeServer, &str, &[Value]) -> Outcome + Send + 'static,
) -> (Connection, JoinHandle<()>) {
    connect_with(None, config, handler)
}

/// Like [`connect_with_handler`], but the stub server only accepts
/// `expected_password`; any other password is rejected at login.
pub fn connect_expecting_password(
    expected_password: &str,
    password_used: &str,
    handler: impl FnMut(&mut FakeServer, &str, &[Value]) -> Outcome + Send + 'static,
) -> Result<Connection, ponydb::HdbError> {
    let (client_side, server_side) = PipeTransport::pair();
    let activity = Arc::new(Mutex::new(LobActivity::default()));
    let expected = expected_password.to_string();
    let server = FakeServer::new(Arc::new(server_side) as Arc<dyn FrameTransport>, Some(expected), activity);
    let handle = std::thread::spawn(move || server.run(handler));

    let params = ConnectParams::builder()
        .hostname("unused")
        .user("alice")
        .password(password_used)
        .build()
        .unwrap();
    let result = Connection::handshake(
        Arc::new(client_side),
        &params,
        ConnectionConfiguration::default(),
    );
    let _ = handle.join();
    result
}

fn connect_with(
    accept_password: Option<String>,
    config: ConnectionConfiguration,
    handler: impl FnMut(&mut FakeServer, &str, &[Value]) -> Outcome + Send + 'static,
) -> (Connection, JoinHandle<()>) {
    let (client_side, server_side) = PipeTransport::pair();
    let activity = Arc::new(Mutex::new(LobActivity::default()));
    let server = FakeServer::new(Arc::new(server_side) as Arc<dyn FrameTransport>, accept_password, activity);
    let handle = std::thread::spawn(move || server.run(handler));

    let params = ConnectParams::builder()
        .hostname("unused")
        .user("alice")
        .password("s3cret")
        .build()
        .unwrap();
    let connection = Connection::handshake(Arc::new(client_side), &params, config)
        .expect("stub handshake always succeeds when no password is enforced");
    (connection, handle)
}

/// Like [`connect_with_handler`] but also gives back a handle for recording
/// upload/download activity (push-part counts, collected bytes). The handler
/// receives the [`FakeServer`] itself, so it can call
/// [`FakeServer::register_download`] while building a row.
pub fn connect_with_lob_server(
    handler: impl FnMut(&mut FakeServer, &str, &[Value]) -> Outcome + Send + 'static,
) -> (Connection, Arc<Mutex<LobActivity>>, JoinHandle<()>) {
    let (client_side, server_side) = PipeTransport::pair();
    let activity = Arc::new(Mutex::new(LobActivity::default()));
    let server = FakeServer::new(Arc::new(server_side) as Arc<dyn FrameTransport>, None, Arc::clone(&activity));
    let handle = std::thread::spawn(move || server.run(handler));

    let params = ConnectParams::builder()
        .hostname("unused")
        .user("alice")
        .password("s3cret")
        .build()
        .unwrap();
    let connection = Connection::handshake(
        Arc::new(client_side),
        &params,
        ConnectionConfiguration::default(),
    )
    .expect("stub handshake always succeeds when no password is enforced");
    (connection, activity, handle)
}

/// Connects a [`Connection`], also handing back a fake-server transport handle
/// that the test can use to emit server-initiated trigger events directly
/// (dispatch id -1) independently of the request/response loop.
pub fn connect_with_trigger_emitter(
    handler: impl FnMut(&mut FakeServer, &str, &[Value]) -> Outcome + Send + 'static,
) -> (Connection, Arc<dyn FrameTransport>, JoinHandle<()>) {
    let (client_side, server_side) = PipeTransport::pair();
    let server_transport: Arc<dyn FrameTransport> = Arc::new(server_side);
    let activity = Arc::new(Mutex::new(LobActivity::default()));
    let server = FakeServer::new(Arc::clone(&server_transport), None, activity);
    let handle = std::thread::spawn(move || server.run(handler));

    let params = ConnectParams::builder()
        .hostname("unused")
        .user("alice")
        .password("s3cret")
        .build()
        .unwrap();
    let connection = Connection::handshake(
        Arc::new(client_side),
        &params,
        ConnectionConfiguration::default(),
    )
    .expect("stub handshake always succeeds when no password is enforced");
    (connection, server_transport, handle)
}

/// Writes a `DATABASE_EVENT` frame at the reserved dispatch id (-1), the wire
/// shape a trigger subscriber listens for.
pub fn emit_trigger_event(transport: &dyn FrameTransport, name: &str, source: &str, fire_count: u64) {
    let payload = format!("{name} {source} {fire_count}");
    let mut frame = Vec::new();
    frame.write_i32::<BigEndian>(-1).unwrap();
    frame.write_i32::<BigEndian>(Command::DatabaseEvent as i32).unwrap();
    write_utf(&mut frame, &payload);
    transport.write_frame(&frame).unwrap();
}

/// Writes a bare `PING` event at the reserved dispatch id (-1): a server
/// keepalive with no trigger payload attached.
pub fn emit_ping_event(transport: &dyn FrameTransport) {
    let mut frame = Vec::new();
    frame.write_i32::<BigEndian>(-1).unwrap();
    frame.write_i32::<BigEndian>(Command::Ping as i32).unwrap();
    transport.write_frame(&frame).unwrap();
}
