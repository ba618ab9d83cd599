/// Errors that can occur while assembling or encoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared frame does not fit in the frame buffer.
    #[error("frame too large ({declared} bytes, capacity {capacity})")]
    FrameTooLarge { declared: usize, capacity: usize },

    /// A byte was fed to a frame that is already complete.
    #[error("frame already complete")]
    AlreadyComplete,

    /// The message body could not be produced.
    #[error("message error: {0}")]
    Message(#[from] MessageError),
}

/// Errors raised by a message type's body serializer or parser.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The destination region cannot hold the serialized body.
    #[error("buffer too small ({needed} bytes needed, {available} available)")]
    BufferTooSmall { needed: usize, available: usize },

    /// The body bytes do not decode to the message type.
    #[error("failed to decode {type_name}: {reason}")]
    Decode {
        type_name: &'static str,
        reason: String,
    },

    /// The message could not be serialized.
    #[error("failed to encode {type_name}: {reason}")]
    Encode {
        type_name: &'static str,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, FrameError>;
