use crate::error::Result;
use crate::frame::{ConnectionId, Frame};

/// Per-connection incremental parser from raw stream bytes to frames.
///
/// Holds at most one in-progress frame. A fresh frame is started lazily when
/// bytes arrive and none is pending, so bytes following a completed frame in
/// the same chunk begin the next one.
#[derive(Debug)]
pub struct FrameAssembler {
    origin: ConnectionId,
    capacity: usize,
    current: Option<Frame>,
}

impl FrameAssembler {
    /// Create an assembler for frames arriving on `origin`.
    pub fn new(origin: ConnectionId, capacity: usize) -> Self {
        Self {
            origin,
            capacity,
            current: None,
        }
    }

    /// Feed one byte. Returns the frame it completed, if any.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Frame>> {
        let (origin, capacity) = (self.origin, self.capacity);
        let frame = self
            .current
            .get_or_insert_with(|| Frame::new(origin, capacity));

        if frame.feed(byte)? {
            return Ok(self.current.take());
        }
        Ok(None)
    }

    /// Feed a chunk byte-by-byte, handing each completed frame to `on_frame`.
    ///
    /// Returns the number of frames completed. On error the remaining bytes
    /// of the chunk are not consumed and the invalid frame stays pending until
    /// [`reset`](Self::reset).
    pub fn push_bytes<F>(&mut self, bytes: &[u8], mut on_frame: F) -> Result<usize>
    where
        F: FnMut(Frame),
    {
        let mut completed = 0usize;
        for &byte in bytes {
            if let Some(frame) = self.feed(byte)? {
                on_frame(frame);
                completed += 1;
            }
        }
        Ok(completed)
    }

    /// The frame currently being assembled.
    pub fn partial(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    /// Whether bytes of an unfinished frame are pending.
    pub fn has_partial(&self) -> bool {
        self.current.is_some()
    }

    /// Discard any pending frame.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Connection this assembler belongs to.
    pub fn origin(&self) -> ConnectionId {
        self.origin
    }

    /// Capacity of the frames this assembler creates.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
