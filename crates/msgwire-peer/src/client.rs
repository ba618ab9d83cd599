use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use msgwire_frame::{encode_message, ConnectionId, Message};
use msgwire_transport::subsystem::{self, SubsystemGuard};
use msgwire_transport::{tcp, Interest, Reactor, ReactorHandle, ReadyHandler, Registry};
use tracing::{debug, info};

use crate::config::EndpointConfig;
use crate::connection::{Connection, ConnectionStream, ReadStatus};
use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, PeerError, Result};
use crate::io::IoThread;
use crate::queue::FrameQueue;

/// The client always numbers its single connection 1.
const CLIENT_CONNECTION: ConnectionId = ConnectionId(1);

/// Reactor callbacks for the client's one connection.
///
/// The I/O thread stops itself once the connection closes.
struct ClientIo {
    conn: Connection,
    queue: Arc<FrameQueue>,
    connected: Arc<AtomicBool>,
    chunk: Vec<u8>,
    reactor: ReactorHandle,
}

impl ReadyHandler for ClientIo {
    fn on_accept_ready(&mut self, fd: RawFd, registry: &mut Registry) {
        registry.deregister(fd);
    }

    fn on_read_ready(&mut self, fd: RawFd, registry: &mut Registry) {
        match self.conn.on_readable(&mut self.chunk, &self.queue) {
            ReadStatus::Open => {}
            ReadStatus::Closed(reason) => {
                info!(conn = %self.conn.id(), %reason, "connection closed");
                registry.deregister(fd);
                self.conn.close();
                self.connected.store(false, Ordering::SeqCst);
                self.reactor.stop();
            }
        }
    }
}

/// One outbound connection with its own I/O thread.
///
/// Inbound frames queue up until the application calls
/// [`process`](Self::process), which runs handlers on the calling thread.
pub struct Client {
    config: EndpointConfig,
    dispatcher: Dispatcher,
    queue: Arc<FrameQueue>,
    connected: Arc<AtomicBool>,
    stream: Option<Arc<ConnectionStream>>,
    io: Option<IoThread>,
    subsystem: Option<SubsystemGuard>,
}

impl Client {
    /// Create a disconnected client with default configuration.
    pub fn new() -> Self {
        Self::with_config(EndpointConfig::default())
    }

    /// Create a disconnected client with explicit configuration.
    pub fn with_config(config: EndpointConfig) -> Self {
        Self {
            queue: Arc::new(FrameQueue::new(config.queue)),
            config,
            dispatcher: Dispatcher::new(),
            connected: Arc::new(AtomicBool::new(false)),
            stream: None,
            io: None,
            subsystem: None,
        }
    }

    /// Register the handler for message type `T`.
    pub fn register<T, F>(&mut self, handler: F) -> std::result::Result<(), DispatchError>
    where
        T: Message,
        F: FnMut(ConnectionId, T) + Send + 'static,
    {
        self.dispatcher.register::<T, F>(handler)
    }

    /// Connect to `host:port` and start the I/O thread.
    ///
    /// Fails without side effects if the address does not resolve or no
    /// candidate accepts the connection. After the peer has closed a previous
    /// connection, this reconnects and keeps the registered handlers.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if self.io.is_some() {
            if self.connected.load(Ordering::SeqCst) {
                return Err(PeerError::AlreadyRunning);
            }
            debug!("reaping closed connection before reconnect");
            self.shutdown_io();
        }

        let guard = subsystem::acquire()?;
        let stream = tcp::connect(host, port, self.config.connect_timeout)?;
        let conn = Connection::new(CLIENT_CONNECTION, stream, self.config.frame_capacity)
            .map_err(msgwire_transport::TransportError::from)?;

        let mut reactor = Reactor::new()?;
        reactor.registry().register(conn.fd(), Interest::Read);
        let reactor_handle = reactor.handle();

        let shared = conn.shared();
        let peer_addr = conn.peer_addr();
        self.connected.store(true, Ordering::SeqCst);
        let handler = ClientIo {
            conn,
            queue: Arc::clone(&self.queue),
            connected: Arc::clone(&self.connected),
            chunk: vec![0u8; self.config.read_chunk_size.max(1)],
            reactor: reactor_handle,
        };
        let io = match IoThread::spawn("msgwire-client-io", reactor, handler) {
            Ok(io) => io,
            Err(err) => {
                self.connected.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };

        self.stream = Some(shared);
        self.io = Some(io);
        self.subsystem = Some(guard);
        info!(host, port, peer = ?peer_addr, "client connected");
        Ok(())
    }

    /// Whether the connection is open. Turns false once the peer closes.
    pub fn is_connected(&self) -> bool {
        self.io.is_some() && self.connected.load(Ordering::SeqCst)
    }

    /// Id stamped on frames from the current connection.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.stream.as_ref().map(|stream| stream.id())
    }

    /// Dispatch every queued frame on the calling thread.
    ///
    /// Returns the number of frames whose handler ran.
    pub fn process(&mut self) -> usize {
        let frames = self.queue.drain();
        self.dispatcher.dispatch_all(frames)
    }

    /// Like [`process`](Self::process), but waits up to `timeout` for the
    /// first frame when the queue is empty.
    pub fn process_timeout(&mut self, timeout: Duration) -> usize {
        let frames = self.queue.wait_drain(timeout);
        self.dispatcher.dispatch_all(frames)
    }

    /// Write pre-encoded frame bytes.
    pub fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream.as_ref().ok_or(PeerError::NotConnected)?;
        if !self.connected.load(Ordering::SeqCst) {
            return Err(PeerError::NotConnected);
        }
        stream.send(bytes, self.config.write_timeout)?;
        Ok(())
    }

    /// Encode and send `message`.
    pub fn send<T: Message>(&self, message: &T) -> Result<()> {
        let wire = encode_message(message, self.config.frame_capacity)?;
        self.send_bytes(&wire)
    }

    /// Inbound queue shared with the I/O thread.
    pub fn queue(&self) -> &FrameQueue {
        &self.queue
    }

    /// Frames discarded by the inbound queue's overflow policy.
    pub fn dropped_frames(&self) -> u64 {
        self.queue.dropped()
    }

    /// Close the connection, join the I/O thread, and release handlers and
    /// queued frames. Idempotent.
    pub fn disconnect(&mut self) {
        if !self.shutdown_io() {
            return;
        }
        self.queue.clear();
        self.dispatcher.clear();
        debug!("client disconnected");
    }

    /// Close the socket and join the I/O thread, leaving handlers and queued
    /// frames in place. Returns whether an I/O thread was running.
    fn shutdown_io(&mut self) -> bool {
        let Some(mut io) = self.io.take() else {
            return false;
        };
        if let Some(stream) = self.stream.take() {
            stream.close();
        }
        io.stop();

        self.connected.store(false, Ordering::SeqCst);
        self.subsystem = None;
        true
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("connected", &self.is_connected())
            .field("queued", &self.queue.len())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
