//! Client/server endpoints for msgwire.
//!
//! Each endpoint owns one background I/O thread that drives a reactor,
//! assembles frames from the socket byte stream, and pushes completed frames
//! onto a mutex-guarded inbound queue. The application thread drains that
//! queue with `process()`, which decodes each frame and runs the handler
//! registered for its type, synchronously, on the calling thread.

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod server;

mod io;

pub use client::Client;
pub use config::{EndpointConfig, OverflowPolicy, QueueConfig};
pub use connection::{CloseReason, Connection, ReadStatus};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, PeerError, Result};
pub use msgwire_frame::{ConnectionId, Frame, Message};
pub use queue::FrameQueue;
pub use server::{Server, ServerSender};
