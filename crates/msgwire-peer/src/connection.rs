use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use msgwire_frame::{ConnectionId, Frame, FrameAssembler, FrameError};
use msgwire_transport::{tcp, ReadOutcome, TransportError};
use tracing::{debug, trace};

use crate::queue::FrameQueue;

/// Socket half of a connection, shared between the I/O thread and senders.
///
/// Whole frames are written under a per-connection lock so concurrent
/// senders never interleave bytes.
#[derive(Debug)]
pub(crate) struct ConnectionStream {
    id: ConnectionId,
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    write_lock: Mutex<()>,
}

impl ConnectionStream {
    fn new(id: ConnectionId, stream: TcpStream) -> Self {
        let peer_addr = stream.peer_addr().ok();
        Self {
            id,
            stream,
            peer_addr,
            write_lock: Mutex::new(()),
        }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    /// Write one encoded frame.
    pub(crate) fn send(&self, bytes: &[u8], timeout: Option<Duration>) -> Result<(), TransportError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        tcp::write_all(&self.stream, bytes, timeout)
    }

    /// Shut down both directions. The descriptor itself closes when the last
    /// owner drops, so the reactor never observes a recycled fd.
    pub(crate) fn close(&self) {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => debug!(conn = %self.id, "connection shut down"),
            Err(err) => trace!(conn = %self.id, error = %err, "shutdown on closed socket"),
        }
    }
}

/// Why the read path closed a connection.
#[derive(Debug)]
pub enum CloseReason {
    /// The peer closed its side.
    Eof,
    /// The peer sent a frame that does not fit the frame buffer.
    Frame(FrameError),
    /// Reading from the socket failed.
    Io(TransportError),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eof => f.write_str("peer closed the connection"),
            Self::Frame(err) => write!(f, "protocol violation: {err}"),
            Self::Io(err) => write!(f, "read failed: {err}"),
        }
    }
}

/// Result of servicing one read-readiness event.
#[derive(Debug)]
pub enum ReadStatus {
    /// The connection stays open.
    Open,
    /// The connection must be closed; any partial frame was discarded.
    Closed(CloseReason),
}

/// Per-socket receive state: the socket plus its in-progress frame.
///
/// Owned by the I/O thread. Completed frames go to the shared
/// [`FrameQueue`] tagged with this connection's id.
#[derive(Debug)]
pub struct Connection {
    stream: Arc<ConnectionStream>,
    assembler: FrameAssembler,
}

impl Connection {
    /// Wrap an accepted or connected stream. The stream is switched to
    /// non-blocking mode.
    pub fn new(id: ConnectionId, stream: TcpStream, frame_capacity: usize) -> std::io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream: Arc::new(ConnectionStream::new(id, stream)),
            assembler: FrameAssembler::new(id, frame_capacity),
        })
    }

    /// Connection id assigned by the owning endpoint.
    pub fn id(&self) -> ConnectionId {
        self.stream.id
    }

    /// Remote address, if the socket reported one when accepted.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr
    }

    /// Descriptor the reactor watches for this connection.
    pub fn fd(&self) -> RawFd {
        self.stream.fd()
    }

    /// The frame currently being assembled, if any.
    pub fn partial(&self) -> Option<&Frame> {
        self.assembler.partial()
    }

    /// Drain every available byte into the assembler, pushing completed
    /// frames onto `queue`.
    ///
    /// `chunk` is scratch space for socket reads. On any closing status the
    /// partial frame is discarded.
    pub fn on_readable(&mut self, chunk: &mut [u8], queue: &FrameQueue) -> ReadStatus {
        let mut violation = None;
        let assembler = &mut self.assembler;
        let outcome = tcp::read_available(&self.stream.stream, chunk, |bytes| {
            match assembler.push_bytes(bytes, |frame| {
                trace!(conn = %frame.origin(), type_id = ?frame.type_id(), "frame complete");
                queue.push(frame);
            }) {
                Ok(_) => true,
                Err(err) => {
                    violation = Some(err);
                    false
                }
            }
        });

        let status = match (violation, outcome) {
            (Some(err), _) => ReadStatus::Closed(CloseReason::Frame(err)),
            (None, Ok(ReadOutcome::Eof(_))) => ReadStatus::Closed(CloseReason::Eof),
            (None, Ok(_)) => ReadStatus::Open,
            (None, Err(err)) => ReadStatus::Closed(CloseReason::Io(err)),
        };
        if matches!(status, ReadStatus::Closed(_)) {
            self.assembler.reset();
        }
        status
    }

    /// Write one encoded frame.
    pub fn send(&self, bytes: &[u8], timeout: Option<Duration>) -> Result<(), TransportError> {
        self.stream.send(bytes, timeout)
    }

    /// Shut the socket down in both directions.
    pub fn close(&self) {
        self.stream.close();
    }

    pub(crate) fn shared(&self) -> Arc<ConnectionStream> {
        Arc::clone(&self.stream)
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, TcpListener};
    use std::thread;
    use std::time::Instant;

    use bytes::BytesMut;
    use msgwire_frame::{encode_frame, FrameHeader, DEFAULT_FRAME_CAPACITY};

    use super::*;
    use crate::config::QueueConfig;

    fn pair() -> (TcpStream, Connection) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have an address");
        let client = TcpStream::connect(addr).expect("client should connect");
        let (accepted, _) = listener.accept().expect("listener should accept");
        let conn = Connection::new(ConnectionId(1), accepted, 64).expect("connection should wrap");
        (client, conn)
    }

    fn read_until<F>(conn: &mut Connection, queue: &FrameQueue, mut done: F) -> ReadStatus
    where
        F: FnMut(&Connection, &FrameQueue) -> bool,
    {
        let mut chunk = [0u8; 5];
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let status = conn.on_readable(&mut chunk, queue);
            if matches!(status, ReadStatus::Closed(_)) || done(conn, queue) {
                return status;
            }
            assert!(Instant::now() < deadline, "read timed out");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn frames_are_queued_with_connection_origin() {
        let (client, mut conn) = pair();
        let queue = FrameQueue::new(QueueConfig::default());

        let mut wire = BytesMut::new();
        encode_frame(10, b"one", DEFAULT_FRAME_CAPACITY, &mut wire).unwrap();
        encode_frame(11, b"", DEFAULT_FRAME_CAPACITY, &mut wire).unwrap();
        encode_frame(12, b"three", DEFAULT_FRAME_CAPACITY, &mut wire).unwrap();
        tcp::write_all(&client, &wire, None).unwrap();

        let status = read_until(&mut conn, &queue, |_, q| q.len() == 3);
        assert!(matches!(status, ReadStatus::Open));

        let frames = queue.drain();
        let ids: Vec<u32> = frames.iter().filter_map(Frame::type_id).collect();
        assert_eq!(ids, vec![10, 11, 12]);
        assert!(frames.iter().all(|f| f.origin() == ConnectionId(1)));
        assert_eq!(frames[2].body(), b"three");
    }

    #[test]
    fn peer_close_discards_partial_frame() {
        let (client, mut conn) = pair();
        let queue = FrameQueue::new(QueueConfig::default());

        let mut wire = BytesMut::new();
        FrameHeader::new(3, 10).encode(&mut wire);
        tcp::write_all(&client, &wire[..6], None).unwrap();
        let status = read_until(&mut conn, &queue, |c, _| {
            c.partial().map(Frame::cursor) == Some(6)
        });
        assert!(matches!(status, ReadStatus::Open));
        drop(client);

        let status = read_until(&mut conn, &queue, |_, _| false);
        assert!(matches!(status, ReadStatus::Closed(CloseReason::Eof)));
        assert!(conn.partial().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn oversized_frame_closes_connection() {
        let (client, mut conn) = pair();
        let queue = FrameQueue::new(QueueConfig::default());

        let mut wire = BytesMut::new();
        FrameHeader::new(3, 1000).encode(&mut wire);
        tcp::write_all(&client, &wire, None).unwrap();

        let status = read_until(&mut conn, &queue, |_, _| false);
        assert!(matches!(
            status,
            ReadStatus::Closed(CloseReason::Frame(FrameError::FrameTooLarge { capacity: 64, .. }))
        ));
        assert!(conn.partial().is_none());
    }

    #[test]
    fn send_writes_whole_frames() {
        let (client, conn) = pair();
        let mut wire = BytesMut::new();
        encode_frame(5, b"reply", DEFAULT_FRAME_CAPACITY, &mut wire).unwrap();
        conn.send(&wire, Some(Duration::from_secs(5))).unwrap();

        let mut received = vec![0u8; wire.len()];
        std::io::Read::read_exact(&mut &client, &mut received).unwrap();
        assert_eq!(received, wire.to_vec());
        assert!(conn.peer_addr().is_some());
    }

    #[test]
    fn close_is_idempotent_and_seen_by_peer() {
        let (client, conn) = pair();
        conn.close();
        conn.close();

        let mut buf = [0u8; 1];
        let n = std::io::Read::read(&mut &client, &mut buf).unwrap();
        assert_eq!(n, 0);
    }
}
