//! TCP transport for msgwire.
//!
//! Provides the socket substrate the rest of msgwire builds on:
//! - listening/connected TCP sockets configured for readiness-driven I/O
//! - a `poll(2)` reactor reporting accept/read readiness to a handler
//! - process-wide socket subsystem state with an explicit init/teardown lifecycle
//!
//! This is the lowest layer of msgwire. Only Unix targets are supported.

pub mod error;
pub mod subsystem;

#[cfg(unix)]
pub mod reactor;
#[cfg(unix)]
pub mod tcp;

pub use error::{Result, TransportError};

#[cfg(unix)]
pub use reactor::{Interest, Reactor, ReactorHandle, ReadyHandler, Registry};
#[cfg(unix)]
pub use tcp::{bind_listener, connect, read_available, write_all, ReadOutcome};
