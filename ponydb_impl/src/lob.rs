//! Large-object channel (C4, §4.4): chunked upload of pending streamable
//! objects before a query is submitted, and chunked, page-buffered download
//! of streamable objects referenced by returned rows.

use crate::dispatch::Dispatcher;
use crate::error::{protocol_err, HdbError, HdbResult};
use crate::wire::{Command, ResponseStatus, StreamKind, Value};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// A byte source registered for upload, together with its declared total
/// length (§3, "Streamable object").
pub struct PendingUpload {
    pub kind: StreamKind,
    pub total_length: i64,
    pub source: Box<dyn Read + Send>,
}

/// The client-side registry of uploads that have been allocated but not yet
/// pushed to the server (§4.4, "Upload"). Keyed by the 64-bit id handed out in
/// the [`Value::StreamableHandle`] that the application binds as a parameter.
#[derive(Default)]
pub struct UploadRegistry {
    next_id: AtomicI64,
    pending: Mutex<std::collections::HashMap<i64, PendingUpload>>,
}

impl std::fmt::Debug for UploadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRegistry").finish_non_exhaustive()
    }
}

impl UploadRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            pending: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Registers a byte source for later upload and returns the handle to bind
    /// as a query parameter.
    pub fn register(
        &self,
        kind: StreamKind,
        total_length: i64,
        source: Box<dyn Read + Send>,
    ) -> HdbResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.pending.lock()?.insert(
            id,
            PendingUpload {
                kind,
                total_length,
                source,
            },
        );
        Ok(Value::StreamableHandle {
            kind,
            size: total_length,
            id,
        })
    }

    fn take(&self, id: i64) -> HdbResult<Option<PendingUpload>> {
        Ok(self.pending.lock()?.remove(&id))
    }
}

/// Streams every [`Value::StreamableHandle`] appearing in `params` to the
/// server in fixed-size blocks before the enclosing query is submitted
/// (§4.4). Handles not found in `registry` (e.g. download handles echoed back
/// as parameters, which cannot happen in practice) are left untouched.
pub fn upload_pending(
    dispatcher: &Dispatcher,
    registry: &UploadRegistry,
    params: &[Value],
    chunk_size: usize,
) -> HdbResult<()> {
    for param in params {
        if let Value::StreamableHandle { id, .. } = param {
            if let Some(upload) = registry.take(*id)? {
                upload_one(dispatcher, *id, upload, chunk_size)?;
            }
        }
    }
    Ok(())
}

fn upload_one(
    dispatcher: &Dispatcher,
    id: i64,
    mut upload: PendingUpload,
    chunk_size: usize,
) -> HdbResult<()> {
    let mut sent: i64 = 0;
    let mut buf = vec![0u8; chunk_size];
    while sent < upload.total_length {
        let want = usize::try_from(upload.total_length - sent)
            .unwrap_or(chunk_size)
            .min(chunk_size);
        let mut filled = 0;
        while filled < want {
            let n = upload.source.read(&mut buf[filled..want])?;
            if n == 0 {
                return Err(HdbError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "streamable object {id}: source ended after {sent} of {} bytes",
                        upload.total_length
                    ),
                )));
            }
            filled += n;
        }
        trace!("lob upload chunk: id={id} offset={sent} len={filled}");
        push_part(dispatcher, upload.kind, id, upload.total_length, sent, &buf[..filled])?;
        sent += filled as i64;
    }
    debug!("lob upload complete: id={id} total={}", upload.total_length);
    Ok(())
}

fn push_part(
    dispatcher: &Dispatcher,
    kind: StreamKind,
    id: i64,
    total_length: i64,
    offset: i64,
    bytes: &[u8],
) -> HdbResult<()> {
    let mut body = Vec::with_capacity(bytes.len() + 32);
    body.write_u8(kind.code())?;
    body.write_i64::<BigEndian>(id)?;
    body.write_i64::<BigEndian>(total_length)?;
    body.write_i32::<BigEndian>(i32::try_from(bytes.len()).map_err(|_| {
        protocol_err!("streamable object chunk too large ({} bytes)", bytes.len())
    })?)?;
    body.write_all(bytes)?;
    body.write_i64::<BigEndian>(offset)?;

    let reply = dispatcher.submit(Command::PushStreamableObjectPart, &body, None)?;
    let mut cursor: &[u8] = &reply;
    let status = cursor.read_i32::<BigEndian>()?;
    match ResponseStatus::try_new(status)? {
        ResponseStatus::Success => Ok(()),
        other => Err(protocol_err!(
            "push of streamable object part failed with status {other:?}"
        )),
    }
}

/// A lazily-fetched, page-buffered reader over a downloadable streamable
/// object (§4.4, "Download"). Reads translate into `STREAMABLE_OBJECT_SECTION`
/// requests for one page at a time.
pub struct LobReader {
    dispatcher: Arc<Dispatcher>,
    result_id: i32,
    obj_id: i64,
    size: i64,
    pos: i64,
    page_size: usize,
    page: Vec<u8>,
    page_pos: usize,
}

impl LobReader {
    pub fn new(dispatcher: Arc<Dispatcher>, result_id: i32, obj_id: i64, size: i64, page_size: usize) -> Self {
        Self {
            dispatcher,
            result_id,
            obj_id,
            size,
            pos: 0,
            page_size: page_size.max(1),
            page: Vec::new(),
            page_pos: 0,
        }
    }

    /// Seeds the reader with data already available client-side (an inline
    /// value that never required a download), so `read` serves it directly
    /// without a `STREAMABLE_OBJECT_SECTION` round trip.
    #[must_use]
    pub fn with_preloaded(mut self, data: Vec<u8>) -> Self {
        self.pos = self.size;
        self.page = data;
        self.page_pos = 0;
        self
    }

    /// Total logical size in bytes (§3, "Streamable object").
    pub fn len(&self) -> i64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn fetch_page(&mut self) -> HdbResult<()> {
        let remaining = self.size - self.pos;
        if remaining <= 0 {
            self.page.clear();
            self.page_pos = 0;
            return Ok(());
        }
        let want = i32::try_from(remaining.min(self.page_size as i64)).unwrap_or(i32::MAX);
        let mut body = Vec::with_capacity(24);
        body.write_i32::<BigEndian>(self.result_id)?;
        body.write_i64::<BigEndian>(self.obj_id)?;
        body.write_i64::<BigEndian>(self.pos)?;
        body.write_i32::<BigEndian>(want)?;
        trace!(
            "lob fetch chunk: obj_id={} offset={} len={}",
            self.obj_id, self.pos, want
        );
        let reply = self
            .dispatcher
            .submit(Command::StreamableObjectSection, &body, None)?;
        let mut cursor: &[u8] = &reply;
        let status = cursor.read_i32::<BigEndian>()?;
        match ResponseStatus::try_new(status)? {
            ResponseStatus::Success => {
                let len = cursor.read_i32::<BigEndian>()?;
                let mut data = vec![0u8; usize::try_from(len).unwrap_or(0)];
                cursor.read_exact(&mut data)?;
                self.pos += data.len() as i64;
                self.page = data;
                self.page_pos = 0;
                Ok(())
            }
            other => Err(protocol_err!(
                "fetch of streamable object part failed with status {other:?}"
            )),
        }
    }
}

impl Read for LobReader {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        if self.page_pos >= self.page.len() {
            if self.pos >= self.size {
                return Ok(0);
            }
            self.fetch_page()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
            if self.page.is_empty() {
                return Ok(0);
            }
        }
        let n = out.len().min(self.page.len() - self.page_pos);
        out[..n].copy_from_slice(&self.page[self.page_pos..self.page_pos + n]);
        self.page_pos += n;
        Ok(n)
    }
}

/// Issues `DISPOSE_STREAMABLE_OBJECT` for a downloaded object (§4.4, §6).
pub fn dispose_streamable_object(dispatcher: &Dispatcher, result_id: i32, obj_id: i64) -> HdbResult<()> {
    let mut body = Vec::with_capacity(12);
    body.write_i32::<BigEndian>(result_id)?;
    body.write_i64::<BigEndian>(obj_id)?;
    let reply = dispatcher.submit(Command::DisposeStreamableObject, &body, None)?;
    let mut cursor: &[u8] = &reply;
    let status = cursor.read_i32::<BigEndian>()?;
    match ResponseStatus::try_new(status)? {
        ResponseStatus::Success => Ok(()),
        other => Err(protocol_err!(
            "dispose of streamable object failed with status {other:?}"
        )),
    }
}

/// Adapts a [`LobReader`] of character-stream bytes (2 bytes per UTF-16 code
/// unit, big-endian, §4.4) into a UTF-8 byte reader.
pub struct ClobReader {
    inner: LobReader,
    leftover_hi: Option<u8>,
    pending_utf8: std::collections::VecDeque<u8>,
}

impl ClobReader {
    pub fn new(inner: LobReader) -> Self {
        Self {
            inner,
            leftover_hi: None,
            pending_utf8: std::collections::VecDeque::new(),
        }
    }
}

impl Read for ClobReader {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        while self.pending_utf8.is_empty() {
            let mut raw = [0u8; 4096];
            let n = self.inner.read(&mut raw)?;
            if n == 0 {
                return Ok(0);
            }
            let mut units = Vec::with_capacity(n / 2 + 1);
            let mut bytes = raw[..n].iter().copied();
            if let Some(hi) = self.leftover_hi.take() {
                if let Some(lo) = bytes.next() {
                    units.push(u16::from_be_bytes([hi, lo]));
                }
            }
            loop {
                let Some(hi) = bytes.next() else { break };
                match bytes.next() {
                    Some(lo) => units.push(u16::from_be_bytes([hi, lo])),
                    None => {
                        self.leftover_hi = Some(hi);
                        break;
                    }
                }
            }
            for c in char::decode_utf16(units) {
                let c = c.unwrap_or(char::REPLACEMENT_CHARACTER);
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).as_bytes() {
                    self.pending_utf8.push_back(*b);
                }
            }
        }
        let n = out.len().min(self.pending_utf8.len());
        for slot in out.iter_mut().take(n) {
            *slot = self.pending_utf8.pop_front().expect("checked len above");
        }
        Ok(n)
    }
}

/// Adapts a [`LobReader`] of character-stream bytes into an ASCII byte
/// reader by discarding the high byte of each code unit (§4.4).
pub struct AsciiLobReader {
    inner: LobReader,
}

impl AsciiLobReader {
    pub fn new(inner: LobReader) -> Self {
        Self { inner }
    }
}

impl Read for AsciiLobReader {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        let mut raw = vec![0u8; out.len() * 2];
        let n = self.inner.read(&mut raw)?;
        let pairs = n / 2;
        for i in 0..pairs {
            out[i] = raw[2 * i + 1];
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn uploads_register_and_drain() {
        let registry = UploadRegistry::new();
        let data = vec![1u8, 2, 3, 4, 5];
        let handle = registry
            .register(StreamKind::Binary, data.len() as i64, Box::new(Cursor::new(data)))
            .unwrap();
        match handle {
            Value::StreamableHandle { id, size, .. } => {
                assert_eq!(size, 5);
                assert!(registry.pending.lock().unwrap().contains_key(&id));
                assert!(registry.take(id).unwrap().is_some());
                assert!(registry.take(id).unwrap().is_none());
            }
            other => panic!("unexpected value {other:?}"),
        }
    }
}
