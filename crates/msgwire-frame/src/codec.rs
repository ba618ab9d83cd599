use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::header::{FrameHeader, HEADER_SIZE};
use crate::message::Message;

/// Append one frame carrying `body` to `dst`.
///
/// Fails with [`FrameError::FrameTooLarge`] when the frame would not fit in a
/// receiver buffer of `capacity` bytes.
pub fn encode_frame(type_id: u32, body: &[u8], capacity: usize, dst: &mut BytesMut) -> Result<()> {
    let total = HEADER_SIZE + body.len();
    if total > capacity || body.len() > u32::MAX as usize {
        return Err(FrameError::FrameTooLarge {
            declared: total,
            capacity,
        });
    }

    dst.reserve(total);
    FrameHeader::new(type_id, body.len() as u32).encode(dst);
    dst.put_slice(body);
    Ok(())
}

/// Encode `message` as a complete frame.
///
/// The body is serialized straight into the frame's body region.
pub fn encode_message<M: Message>(message: &M, capacity: usize) -> Result<BytesMut> {
    let size = message.byte_size();
    let total = HEADER_SIZE + size;
    if total > capacity {
        return Err(FrameError::FrameTooLarge {
            declared: total,
            capacity,
        });
    }

    let mut buf = BytesMut::zeroed(total);
    let written = message.serialize_into(&mut buf[HEADER_SIZE..])?;
    buf.truncate(HEADER_SIZE + written);

    let header = FrameHeader::new(M::wire_type_id(), written as u32);
    header.encode(&mut &mut buf[..HEADER_SIZE]);
    Ok(buf)
}
