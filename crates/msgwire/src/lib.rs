//! Binary, message-oriented transport over raw TCP.
//!
//! Frames carry an 8-byte header (`body_length`, `type_id`) followed by an
//! opaque body. The `type_id` is a hash of the message type's name, so peers
//! that agree on names agree on discriminants without a shared table.
//!
//! # Crate Structure
//!
//! - [`transport`]: poll-based reactor, TCP helpers, process-wide socket state
//! - [`frame`]: header, incremental frame assembly, type hash, message contract
//! - [`peer`]: client/server endpoints with typed dispatch (behind `peer` feature)
//!
//! # Example
//!
//! ```no_run
//! use msgwire::frame::json_message;
//! use msgwire::peer::{Client, Server};
//!
//! #[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
//! struct Ping {
//!     seq: u32,
//! }
//! json_message!(Ping);
//!
//! let mut server = Server::new();
//! server.register::<Ping, _>(|conn, ping| println!("{conn}: {}", ping.seq))?;
//! server.start(7878, 128)?;
//!
//! let mut client = Client::new();
//! client.connect("127.0.0.1", 7878)?;
//! client.send(&Ping { seq: 1 })?;
//!
//! server.process_timeout(std::time::Duration::from_secs(1));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use msgwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use msgwire_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use msgwire_peer::*;
}
