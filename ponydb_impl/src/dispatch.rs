//! Dispatch multiplexer (C3, §4.3).
//!
//! Owns the framing transport exclusively after login. Many application
//! threads may call [`Dispatcher::submit`] concurrently; a single dedicated
//! reader thread demultiplexes responses by dispatch id and routes
//! server-initiated events (dispatch id -1) onto a side channel.
//!
//! Dispatch ids are `int32` on the wire, matching §4.3/§6 exactly. The
//! reference's naive monotone 32-bit counter is a latent overflow defect on a
//! very long-lived connection; this implementation resolves it with explicit
//! wraparound plus a collision-avoidance check against the pending-response
//! table, rather than widening the wire field (documented in `DESIGN.md`).

use crate::error::{HdbError, HdbResult};
use crate::wire::{Command, FrameTransport};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Dispatch id reserved to mean "server-initiated event, no reply expected" (§3).
pub const EVENT_DISPATCH_ID: i32 = -1;

/// An asynchronous server-initiated message, demultiplexed onto its own channel
/// (§4.6). `Ping` events are consumed silently by the connection; `Database`
/// events carry the raw `"<name> <source> <fireCount>"` payload for the
/// trigger subscriber to parse.
#[derive(Clone, Debug)]
pub enum Event {
    Ping,
    Database { event_type: i32, message: String },
}

enum Entry {
    Waiting,
    Ready(Vec<u8>),
    /// The waiter gave up (timeout); the eventual response is discarded
    /// silently when it arrives (§5, "Cancellation & timeouts").
    Abandoned,
}

struct Shared {
    pending: Mutex<HashMap<i32, Entry>>,
    condvar: Condvar,
    closed: AtomicBool,
}

/// The dispatch multiplexer: the only point of serialisation with the server
/// after login (§4.3).
pub struct Dispatcher {
    transport: Arc<dyn FrameTransport>,
    next_id: AtomicI64,
    writer_lock: Mutex<()>,
    shared: Arc<Shared>,
    events_tx: crossbeam_channel::Sender<Event>,
    events_rx: crossbeam_channel::Receiver<Event>,
    reader: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("closed", &self.shared.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Wraps `transport` and starts the dedicated reader thread. Call this
    /// only after the login handshake has completed (§4.3, §4.6).
    ///
    /// `event_queue_bound` caps the server-event side channel (§9, "bounded
    /// channel with an explicit drop policy"): once full, the reader thread
    /// drops the newest event rather than blocking, since blocking the
    /// reader would stall every in-flight request's response, not just
    /// events.
    pub fn start(transport: Arc<dyn FrameTransport>, event_queue_bound: usize) -> Arc<Self> {
        let (events_tx, events_rx) = crossbeam_channel::bounded(event_queue_bound.max(1));
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            condvar: Condvar::new(),
            closed: AtomicBool::new(false),
        });
        let this = Arc::new(Self {
            transport,
            next_id: AtomicI64::new(1),
            writer_lock: Mutex::new(()),
            shared: Arc::clone(&shared),
            events_tx,
            events_rx,
            reader: Mutex::new(None),
        });
        let reader_transport = Arc::clone(&this.transport);
        let reader_shared = Arc::clone(&shared);
        let reader_events_tx = this.events_tx.clone();
        let handle = std::thread::Builder::new()
            .name("ponydb-reader".into())
            .spawn(move || reader_loop(reader_transport, reader_shared, reader_events_tx))
            .expect("spawning the reader thread");
        *this.reader.lock().expect("reader lock") = Some(handle);
        debug!("dispatch reader thread started");
        this
    }

    /// Receiver for server-initiated events (§4.6); the connection drains this
    /// on the lazily-created trigger dispatch thread.
    pub fn events(&self) -> crossbeam_channel::Receiver<Event> {
        self.events_rx.clone()
    }

    /// Assembles `{command:i32, dispatchId:i32}` followed by `body`, sends it
    /// as one frame, then blocks until the matching response arrives or
    /// `timeout` elapses.
    ///
    /// Returns the raw response bytes *after* the dispatch id (i.e. the
    /// caller parses the status code and command-specific body).
    pub fn submit(
        &self,
        command: Command,
        body: &[u8],
        timeout: Option<Duration>,
    ) -> HdbResult<Vec<u8>> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(HdbError::ConnectionClosed);
        }

        let id = {
            let _guard = self.writer_lock.lock()?;
            let mut pending = self.shared.pending.lock()?;
            let id = self.next_dispatch_id(&pending);
            pending.insert(id, Entry::Waiting);
            drop(pending);
            let mut frame = Vec::with_capacity(8 + body.len());
            frame.write_i32::<BigEndian>(command as i32)?;
            frame.write_i32::<BigEndian>(id)?;
            frame.write_all(body)?;
            trace!("dispatch submit: command={command:?} dispatch_id={id}");
            if let Err(e) = self.transport.write_frame(&frame) {
                self.shared.pending.lock()?.remove(&id);
                return Err(e);
            }
            id
        };

        self.wait_for(id, timeout)
    }

    /// Draws the next wire-valid dispatch id: an `int32` in `[1, i32::MAX]`
    /// (`0` is unused and `EVENT_DISPATCH_ID = -1` is reserved, §3). The
    /// internal counter is a wider `i64` so it never itself overflows; it is
    /// folded back into the 32-bit range on every call, and any candidate
    /// still present in the pending table (i.e. an old request still
    /// in-flight after the counter has wrapped all the way around) is
    /// skipped in favour of the next one, the explicit wraparound +
    /// collision-avoidance step the overflow open question calls for
    /// (`DESIGN.md`) rather than widening the wire field.
    fn next_dispatch_id(&self, pending: &HashMap<i32, Entry>) -> i32 {
        loop {
            let raw = self.next_id.fetch_add(1, Ordering::SeqCst);
            let candidate = i32::try_from(1 + (raw - 1).rem_euclid(i64::from(i32::MAX)))
                .expect("folded into i32 range by construction");
            if !pending.contains_key(&candidate) {
                return candidate;
            }
            warn!("dispatch id {candidate} still pending after counter wraparound, skipping");
        }
    }

    fn wait_for(&self, id: i32, timeout: Option<Duration>) -> HdbResult<Vec<u8>> {
        let mut pending = self.shared.pending.lock()?;
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            match pending.get(&id) {
                Some(Entry::Ready(_)) => {
                    let Some(Entry::Ready(payload)) = pending.remove(&id) else {
                        unreachable!("checked above")
                    };
                    trace!("dispatch reply delivered: dispatch_id={id}");
                    return Ok(payload);
                }
                Some(Entry::Abandoned) | None => {
                    return Err(HdbError::ConnectionClosed);
                }
                Some(Entry::Waiting) => {
                    if self.shared.closed.load(Ordering::Acquire) {
                        pending.remove(&id);
                        return Err(HdbError::ConnectionClosed);
                    }
                    match deadline {
                        None => {
                            pending = self.shared.condvar.wait(pending)?;
                        }
                        Some(deadline) => {
                            let now = Instant::now();
                            if now >= deadline {
                                pending.insert(id, Entry::Abandoned);
                                return Err(HdbError::Timeout);
                            }
                            let (guard, timeout_result) =
                                self.shared.condvar.wait_timeout(pending, deadline - now)?;
                            pending = guard;
                            if timeout_result.timed_out() {
                                // re-check table state before giving up: a reply may have
                                // landed in the same instant the wait woke up.
                                continue;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Closes the transport and fails every pending and future waiter with
    /// [`HdbError::ConnectionClosed`] (§4.3, "Cancellation").
    pub fn close(&self) -> HdbResult<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.transport.close()?;
        {
            let mut pending = self.shared.pending.lock()?;
            pending.clear();
        }
        self.shared.condvar.notify_all();
        if let Some(handle) = self.reader.lock()?.take() {
            let _ = handle.join();
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

fn reader_loop(
    transport: Arc<dyn FrameTransport>,
    shared: Arc<Shared>,
    events_tx: crossbeam_channel::Sender<Event>,
) {
    loop {
        let frame = match transport.read_frame() {
            Ok(f) => f,
            Err(_) => {
                debug!("dispatch reader thread exiting: transport error");
                shared.closed.store(true, Ordering::Release);
                if let Ok(mut pending) = shared.pending.lock() {
                    pending.clear();
                }
                shared.condvar.notify_all();
                return;
            }
        };
        let mut cursor: &[u8] = &frame;
        let dispatch_id = match cursor.read_i32::<BigEndian>() {
            Ok(v) => v,
            Err(_) => continue,
        };
        if dispatch_id == EVENT_DISPATCH_ID {
            if let Some(event) = parse_event(cursor) {
                if let Err(crossbeam_channel::TrySendError::Full(_)) = events_tx.try_send(event) {
                    warn!("event queue full, dropping server-initiated event");
                }
            }
            continue;
        }
        let payload = cursor.to_vec();
        let Ok(mut pending) = shared.pending.lock() else {
            return;
        };
        match pending.get(&dispatch_id) {
            Some(Entry::Abandoned) => {
                pending.remove(&dispatch_id);
            }
            _ => {
                pending.insert(dispatch_id, Entry::Ready(payload));
                shared.condvar.notify_all();
            }
        }
    }
}

fn parse_event(mut cursor: &[u8]) -> Option<Event> {
    let event_type = cursor.read_i32::<BigEndian>().ok()?;
    match Command::try_new(event_type) {
        Ok(Command::Ping) => Some(Event::Ping),
        Ok(Command::DatabaseEvent) => {
            let len = cursor.read_u16::<BigEndian>().ok()?;
            let mut buf = vec![0u8; usize::from(len)];
            cursor.read_exact(&mut buf).ok()?;
            let message = String::from_utf8(buf).ok()?;
            Some(Event::Database {
                event_type,
                message,
            })
        }
        _ => None,
    }
}
