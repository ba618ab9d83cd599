use msgwire_frame::{ConnectionId, MessageError};

/// Errors raised while registering or dispatching typed handlers.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A handler already exists for this type discriminant.
    #[error("type {type_name} (id {type_id}) already registered as {existing}")]
    AlreadyRegistered {
        type_name: &'static str,
        type_id: u32,
        existing: &'static str,
    },

    /// No handler is registered for the frame's type discriminant.
    #[error("no handler registered for type id {0}")]
    UnknownType(u32),

    /// The frame has not been fully assembled.
    #[error("frame is incomplete")]
    Incomplete,

    /// The body failed to decode as the registered type.
    #[error("failed to decode {type_name} body: {source}")]
    Decode {
        type_name: &'static str,
        source: MessageError,
    },
}

/// Errors that can occur in endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] msgwire_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] msgwire_frame::FrameError),

    /// Handler registration or dispatch error.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// The client has no open connection.
    #[error("not connected")]
    NotConnected,

    /// The endpoint is already connected or listening.
    #[error("endpoint already running")]
    AlreadyRunning,

    /// The server has no open connection with this id.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// The I/O thread could not be spawned.
    #[error("failed to spawn I/O thread: {0}")]
    Thread(std::io::Error),
}

pub type Result<T> = std::result::Result<T, PeerError>;
