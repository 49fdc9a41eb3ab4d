//! Length-prefixed framing transport (C2, §4.2).
//!
//! A frame is `uint32 length` (big-endian) followed by `length` bytes of payload.
//! Two realisations are provided: a buffered TCP socket, and an in-memory pipe pair
//! for the embedded/in-process server. The rest of the core depends only on the
//! [`FrameTransport`] trait, never on which realisation is in use.

use crate::error::{HdbResult, HdbError};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;

/// Size of the big-endian length prefix that precedes every frame.
pub(crate) const FRAME_LENGTH_SIZE: usize = 4;

/// Suggested buffer size for buffered TCP streams (§4.2).
const TCP_BUFFER_SIZE: usize = 32 * 1024;

/// A reliable ordered bidirectional byte stream speaking the frame protocol of §4.2.
///
/// Implementations must make `write_frame` atomic with respect to other writers:
/// the length prefix and the payload must never be interleaved with another
/// frame's bytes. `close` is idempotent.
pub trait FrameTransport: Send + Sync {
    /// Writes the length prefix then `payload`, flushing before returning.
    fn write_frame(&self, payload: &[u8]) -> HdbResult<()>;

    /// Blocks until a complete frame is available and returns its payload.
    fn read_frame(&self) -> HdbResult<Vec<u8>>;

    /// Idempotent; subsequent reads/writes fail with [`HdbError::ConnectionClosed`].
    fn close(&self) -> HdbResult<()>;
}

/// A [`FrameTransport`] realised over a TCP socket with buffered I/O in each
/// direction (§4.2a).
#[derive(Debug)]
pub struct TcpTransport {
    reader: Mutex<BufReader<TcpStream>>,
    writer: Mutex<BufWriter<TcpStream>>,
    stream: TcpStream,
    closed: std::sync::atomic::AtomicBool,
}

impl TcpTransport {
    pub fn connect(addr: &str) -> HdbResult<Self> {
        let stream = TcpStream::connect(addr)?;
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> HdbResult<Self> {
        let reader_stream = stream.try_clone()?;
        let writer_stream = stream.try_clone()?;
        Ok(Self {
            reader: Mutex::new(BufReader::with_capacity(TCP_BUFFER_SIZE, reader_stream)),
            writer: Mutex::new(BufWriter::with_capacity(TCP_BUFFER_SIZE, writer_stream)),
            stream,
            closed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> HdbResult<()> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(HdbError::ConnectionClosed);
        }
        Ok(())
    }
}

impl FrameTransport for TcpTransport {
    fn write_frame(&self, payload: &[u8]) -> HdbResult<()> {
        self.check_open()?;
        let mut writer = self.writer.lock()?;
        write_frame_to(&mut *writer, payload)
    }

    fn read_frame(&self) -> HdbResult<Vec<u8>> {
        self.check_open()?;
        let mut reader = self.reader.lock()?;
        read_frame_from(&mut *reader)
    }

    fn close(&self) -> HdbResult<()> {
        if !self.closed.swap(true, std::sync::atomic::Ordering::AcqRel) {
            let _ = self.stream.shutdown(std::net::Shutdown::Both);
        }
        Ok(())
    }
}

/// A [`FrameTransport`] realised over a pair of in-memory pipes, used by the
/// embedded/in-process server (§4.2b).
#[derive(Debug)]
pub struct PipeTransport {
    tx: Mutex<std::sync::mpsc::Sender<Vec<u8>>>,
    rx: Mutex<std::sync::mpsc::Receiver<Vec<u8>>>,
    closed: std::sync::atomic::AtomicBool,
}

impl PipeTransport {
    /// Creates a connected pair of [`PipeTransport`]s: writes to one side arrive,
    /// whole, as reads on the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_b) = std::sync::mpsc::channel();
        let (tx_b, rx_a) = std::sync::mpsc::channel();
        (
            Self {
                tx: Mutex::new(tx_a),
                rx: Mutex::new(rx_a),
                closed: std::sync::atomic::AtomicBool::new(false),
            },
            Self {
                tx: Mutex::new(tx_b),
                rx: Mutex::new(rx_b),
                closed: std::sync::atomic::AtomicBool::new(false),
            },
        )
    }
}

impl FrameTransport for PipeTransport {
    fn write_frame(&self, payload: &[u8]) -> HdbResult<()> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(HdbError::ConnectionClosed);
        }
        let tx = self.tx.lock()?;
        tx.send(payload.to_vec())
            .map_err(|_| HdbError::ConnectionClosed)
    }

    fn read_frame(&self) -> HdbResult<Vec<u8>> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(HdbError::ConnectionClosed);
        }
        let rx = self.rx.lock()?;
        rx.recv().map_err(|_| HdbError::ConnectionClosed)
    }

    fn close(&self) -> HdbResult<()> {
        self.closed
            .store(true, std::sync::atomic::Ordering::Release);
        Ok(())
    }
}

fn write_frame_to<W: Write>(w: &mut W, payload: &[u8]) -> HdbResult<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| crate::error::protocol_err!("frame too large ({} bytes)", payload.len()))?;
    w.write_u32::<BigEndian>(len)?;
    w.write_all(payload)?;
    w.flush()?;
    Ok(())
}

fn read_frame_from<R: Read>(r: &mut R) -> HdbResult<Vec<u8>> {
    let len = r.read_u32::<BigEndian>().map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            HdbError::ConnectionClosed
        } else {
            HdbError::Transport(e)
        }
    })?;
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pipe_roundtrips_a_single_frame() {
        let (a, b) = PipeTransport::pair();
        a.write_frame(b"hello").unwrap();
        assert_eq!(b.read_frame().unwrap(), b"hello");
    }

    #[test]
    fn frames_are_never_split_or_merged() {
        // §8 property 3: a sequence of frames written is read back as the same
        // sequence, regardless of payload sizes.
        let mut buf = Vec::new();
        write_frame_to(&mut buf, b"one").unwrap();
        write_frame_to(&mut buf, b"").unwrap();
        write_frame_to(&mut buf, &vec![7u8; 70_000]).unwrap();

        let mut cursor = &buf[..];
        assert_eq!(read_frame_from(&mut cursor).unwrap(), b"one");
        assert_eq!(read_frame_from(&mut cursor).unwrap(), Vec::<u8>::new());
        assert_eq!(read_frame_from(&mut cursor).unwrap(), vec![7u8; 70_000]);
    }

    #[test]
    fn closed_pipe_fails_reads_and_writes() {
        let (a, b) = PipeTransport::pair();
        a.close().unwrap();
        assert!(matches!(
            a.write_frame(b"x"),
            Err(HdbError::ConnectionClosed)
        ));
        drop(a);
        assert!(matches!(b.read_frame(), Err(HdbError::ConnectionClosed)));
    }
}
