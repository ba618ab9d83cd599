//! Type-tagged framing for msgwire.
//!
//! Every message travels as one frame:
//! - a 4-byte little-endian body length
//! - a 4-byte little-endian type discriminant (BKDR hash of the type name)
//! - the body, produced by the message type's own serializer
//!
//! Frames are assembled byte-by-byte into a fixed-capacity buffer, so a
//! declared body that cannot fit is rejected as soon as its header arrives.

pub mod assembler;
pub mod codec;
pub mod error;
pub mod frame;
pub mod hash;
pub mod header;
pub mod json;
pub mod message;

pub use assembler::FrameAssembler;
pub use codec::{encode_frame, encode_message};
pub use error::{FrameError, MessageError, Result};
pub use frame::{ConnectionId, Frame, DEFAULT_FRAME_CAPACITY};
pub use hash::type_hash;
pub use header::{FrameHeader, HEADER_SIZE};
pub use message::Message;
