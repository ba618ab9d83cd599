use bytes::{Buf, BufMut};

/// Frame header: body length (4) + type id (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Fixed-size prefix of every frame.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬──────────────────────┐
/// │ Body length  │ Type id      │ Body                 │
/// │ (4B LE)      │ (4B LE)      │ (body length bytes)  │
/// └──────────────┴──────────────┴──────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Number of body bytes following the header.
    pub body_length: u32,
    /// Hash of the body's message type name.
    pub type_id: u32,
}

impl FrameHeader {
    /// Create a header.
    pub fn new(type_id: u32, body_length: u32) -> Self {
        Self {
            body_length,
            type_id,
        }
    }

    /// Decode a header from its wire bytes.
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut src = &bytes[..];
        let body_length = src.get_u32_le();
        let type_id = src.get_u32_le();
        Self {
            body_length,
            type_id,
        }
    }

    /// Append the wire bytes of this header to `dst`.
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u32_le(self.body_length);
        dst.put_u32_le(self.type_id);
    }

    /// Header plus declared body length. Saturates instead of wrapping on
    /// targets where `usize` is 32 bits.
    pub fn total_len(&self) -> usize {
        HEADER_SIZE.saturating_add(self.body_length as usize)
    }
}
