use std::fmt;

use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::error::{FrameError, Result};
use crate::header::{FrameHeader, HEADER_SIZE};

/// Default frame buffer capacity (header included).
pub const DEFAULT_FRAME_CAPACITY: usize = 4096;

/// Identifies the connection a frame arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One frame, either being assembled or complete.
///
/// The frame has a fixed capacity. Bytes are fed one at a time: the first
/// [`HEADER_SIZE`] fill the header, the rest fill the body until the
/// declared length is reached. A header declaring more than the capacity
/// makes the frame invalid until [`reset`](Self::reset). Storage grows to the
/// declared length only, so small frames stay small in the inbound queue.
pub struct Frame {
    buf: BytesMut,
    capacity: usize,
    header: Option<FrameHeader>,
    oversized: Option<usize>,
    origin: ConnectionId,
}

impl Frame {
    /// Create an empty frame for bytes arriving on `origin`.
    ///
    /// Capacities below [`HEADER_SIZE`] are raised to it.
    pub fn new(origin: ConnectionId, capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(HEADER_SIZE),
            capacity: capacity.max(HEADER_SIZE),
            header: None,
            oversized: None,
            origin,
        }
    }

    /// Build a complete frame directly from a type id and body.
    pub fn with_body(
        origin: ConnectionId,
        type_id: u32,
        body: &[u8],
        capacity: usize,
    ) -> Result<Self> {
        let mut frame = Self::new(origin, capacity);
        let header = FrameHeader::new(type_id, body.len() as u32);
        let mut wire = BytesMut::with_capacity(HEADER_SIZE);
        header.encode(&mut wire);
        for &byte in wire.iter().chain(body) {
            frame.feed(byte)?;
        }
        Ok(frame)
    }

    /// Consume one stream byte.
    ///
    /// Returns `Ok(true)` exactly when this byte completes the frame. An
    /// empty-body frame completes with the last header byte.
    pub fn feed(&mut self, byte: u8) -> Result<bool> {
        if let Some(declared) = self.oversized {
            return Err(FrameError::FrameTooLarge {
                declared,
                capacity: self.capacity(),
            });
        }
        if self.is_complete() {
            return Err(FrameError::AlreadyComplete);
        }

        self.buf.put_u8(byte);
        let cursor = self.buf.len();

        if cursor < HEADER_SIZE {
            return Ok(false);
        }

        if cursor == HEADER_SIZE {
            let mut raw = [0u8; HEADER_SIZE];
            raw.copy_from_slice(&self.buf[..HEADER_SIZE]);
            let header = FrameHeader::decode(&raw);
            let declared = header.total_len();
            if declared > self.capacity() {
                debug!(
                    origin = %self.origin,
                    declared,
                    capacity = self.capacity(),
                    "frame header exceeds buffer capacity"
                );
                self.oversized = Some(declared);
                return Err(FrameError::FrameTooLarge {
                    declared,
                    capacity: self.capacity(),
                });
            }
            self.buf.reserve(header.body_length as usize);
            self.header = Some(header);
            return Ok(header.body_length == 0);
        }

        Ok(self.total_len() == Some(cursor))
    }

    /// Whether every declared byte has arrived.
    pub fn is_complete(&self) -> bool {
        self.oversized.is_none() && self.total_len() == Some(self.buf.len())
    }

    /// Decoded header, once all header bytes have arrived.
    pub fn header(&self) -> Option<FrameHeader> {
        self.header
    }

    /// Type discriminant from the header.
    pub fn type_id(&self) -> Option<u32> {
        self.header.map(|header| header.type_id)
    }

    /// Bytes received so far, header included.
    pub fn raw(&self) -> &[u8] {
        &self.buf
    }

    /// Buffer capacity, header included.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Declared total length (header + body), once the header is known.
    pub fn total_len(&self) -> Option<usize> {
        self.header.map(|header| header.total_len())
    }

    /// Body bytes received so far.
    pub fn body(&self) -> &[u8] {
        if self.buf.len() <= HEADER_SIZE {
            return &[];
        }
        &self.buf[HEADER_SIZE..]
    }

    /// Declared body length; zero until the header is known.
    pub fn body_len(&self) -> usize {
        self.header
            .map(|header| header.body_length as usize)
            .unwrap_or(0)
    }

    /// How many more body bytes the buffer could hold.
    pub fn remaining_body_capacity(&self) -> usize {
        self.capacity - self.buf.len().max(HEADER_SIZE)
    }

    /// Write position within the buffer.
    pub fn cursor(&self) -> usize {
        self.buf.len()
    }

    /// Connection the bytes came from.
    pub fn origin(&self) -> ConnectionId {
        self.origin
    }

    /// Discard all received bytes and any invalid state.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.header = None;
        self.oversized = None;
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("origin", &self.origin)
            .field("header", &self.header)
            .field("cursor", &self.cursor())
            .field("capacity", &self.capacity())
            .field("complete", &self.is_complete())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::*;

    const ORIGIN: ConnectionId = ConnectionId(1);

    fn wire(type_id: u32, body: &[u8]) -> Vec<u8> {
        let mut out = BytesMut::new();
        FrameHeader::new(type_id, body.len() as u32).encode(&mut out);
        out.put_slice(body);
        out.to_vec()
    }

    #[test]
    fn completes_on_last_body_byte() {
        let bytes = wire(42, b"abc");
        let mut frame = Frame::new(ORIGIN, DEFAULT_FRAME_CAPACITY);

        let (last, rest) = bytes.split_last().unwrap();
        for &byte in rest {
            assert!(!frame.feed(byte).unwrap());
        }
        assert!(frame.feed(*last).unwrap());

        assert!(frame.is_complete());
        assert_eq!(frame.type_id(), Some(42));
        assert_eq!(frame.body(), b"abc");
        assert_eq!(frame.body_len(), 3);
        assert_eq!(frame.total_len(), Some(HEADER_SIZE + 3));
        assert_eq!(frame.raw(), bytes.as_slice());
        assert_eq!(frame.origin(), ORIGIN);
    }

    #[test]
    fn empty_body_completes_after_exactly_header_bytes() {
        let bytes = wire(7, b"");
        assert_eq!(bytes.len(), HEADER_SIZE);

        let mut frame = Frame::new(ORIGIN, DEFAULT_FRAME_CAPACITY);
        for (i, &byte) in bytes.iter().enumerate() {
            let done = frame.feed(byte).unwrap();
            assert_eq!(done, i == HEADER_SIZE - 1);
        }
        assert!(frame.is_complete());
        assert!(frame.body().is_empty());
    }

    #[test]
    fn feeding_complete_frame_is_rejected() {
        let mut frame = Frame::with_body(ORIGIN, 1, b"x", DEFAULT_FRAME_CAPACITY).unwrap();
        assert!(frame.is_complete());
        assert!(matches!(frame.feed(0), Err(FrameError::AlreadyComplete)));
        assert_eq!(frame.body(), b"x");
    }

    #[test]
    fn oversized_header_is_rejected_until_reset() {
        let mut frame = Frame::new(ORIGIN, 64);
        let mut header = BytesMut::new();
        FrameHeader::new(1, 100).encode(&mut header);

        let mut result = Ok(false);
        for &byte in header.iter() {
            result = frame.feed(byte);
        }
        assert!(matches!(
            result,
            Err(FrameError::FrameTooLarge {
                declared: 108,
                capacity: 64
            })
        ));
        assert!(matches!(
            frame.feed(0),
            Err(FrameError::FrameTooLarge { .. })
        ));
        assert!(!frame.is_complete());

        frame.reset();
        for &byte in &wire(2, b"ok") {
            frame.feed(byte).unwrap();
        }
        assert!(frame.is_complete());
        assert_eq!(frame.body(), b"ok");
    }

    #[test]
    fn body_exactly_filling_capacity_is_accepted() {
        let body = vec![0x5A; 64 - HEADER_SIZE];
        let frame = Frame::with_body(ORIGIN, 3, &body, 64).unwrap();
        assert!(frame.is_complete());
        assert_eq!(frame.remaining_body_capacity(), 0);
    }

    #[test]
    fn remaining_capacity_tracks_cursor() {
        let mut frame = Frame::new(ORIGIN, 32);
        assert_eq!(frame.remaining_body_capacity(), 32 - HEADER_SIZE);

        for &byte in &wire(9, b"abcd")[..HEADER_SIZE + 2] {
            frame.feed(byte).unwrap();
        }
        assert_eq!(frame.cursor(), HEADER_SIZE + 2);
        assert_eq!(frame.body(), b"ab");
        assert_eq!(frame.remaining_body_capacity(), 32 - HEADER_SIZE - 2);
    }

    #[test]
    fn storage_grows_to_declared_length_only() {
        let mut frame = Frame::new(ORIGIN, 1 << 20);
        for &byte in &wire(4, b"hi") {
            frame.feed(byte).unwrap();
        }
        assert!(frame.is_complete());
        assert_eq!(frame.capacity(), 1 << 20);
        assert!(frame.buf.capacity() < 1024);
    }

    #[test]
    fn tiny_capacity_is_raised_to_header_size() {
        let frame = Frame::new(ORIGIN, 2);
        assert_eq!(frame.capacity(), HEADER_SIZE);
    }

    #[test]
    fn connection_id_display() {
        assert_eq!(ConnectionId(12).to_string(), "conn-12");
    }
}
