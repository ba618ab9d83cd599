use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use msgwire_frame::{encode_message, ConnectionId, Message};
use msgwire_transport::subsystem::{self, SubsystemGuard};
use msgwire_transport::{tcp, Interest, Reactor, ReadyHandler, Registry, TransportError};
use tracing::{debug, info, warn};

use crate::config::EndpointConfig;
use crate::connection::{Connection, ConnectionStream, ReadStatus};
use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, PeerError, Result};
use crate::io::IoThread;
use crate::queue::FrameQueue;

/// State shared by the server, its I/O thread and every [`ServerSender`].
#[derive(Debug)]
struct Shared {
    connections: Mutex<HashMap<ConnectionId, Arc<ConnectionStream>>>,
    next_id: AtomicU64,
    queue: FrameQueue,
    config: EndpointConfig,
}

impl Shared {
    fn connections(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<ConnectionStream>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionStream>> {
        self.connections().get(&id).cloned()
    }

    fn contains(&self, id: ConnectionId) -> bool {
        self.connections().contains_key(&id)
    }

    /// Remove `id` from the table and shut its socket down. Returns whether
    /// the connection was still open.
    fn close(&self, id: ConnectionId) -> bool {
        let removed = self.connections().remove(&id);
        match removed {
            Some(stream) => {
                stream.close();
                true
            }
            None => false,
        }
    }

    fn close_all(&self) -> usize {
        let drained: Vec<_> = self.connections().drain().collect();
        for (_, stream) in &drained {
            stream.close();
        }
        drained.len()
    }

    fn send_bytes(&self, id: ConnectionId, bytes: &[u8]) -> Result<()> {
        let stream = self.get(id).ok_or(PeerError::UnknownConnection(id))?;
        stream.send(bytes, self.config.write_timeout)?;
        Ok(())
    }

    fn send<T: Message>(&self, id: ConnectionId, message: &T) -> Result<()> {
        let wire = encode_message(message, self.config.frame_capacity)?;
        self.send_bytes(id, &wire)
    }

    fn broadcast<T: Message>(&self, message: &T) -> Result<usize> {
        let wire = encode_message(message, self.config.frame_capacity)?;
        let targets: Vec<Arc<ConnectionStream>> = self.connections().values().cloned().collect();

        let mut delivered = 0usize;
        for stream in targets {
            match stream.send(&wire, self.config.write_timeout) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(conn = %stream.id(), error = %err, "broadcast send failed");
                }
            }
        }
        Ok(delivered)
    }
}

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_millis(200);

/// Pause applied after a hard `accept` failure such as `EMFILE`.
///
/// The listener stays readable while the failure persists, so without a pause
/// the level-triggered reactor would retry immediately.
#[derive(Debug, Default)]
struct AcceptBackoff {
    current: Option<Duration>,
}

impl AcceptBackoff {
    /// Record a failure and return how long to pause. Doubles per
    /// consecutive failure up to [`ACCEPT_BACKOFF_MAX`].
    fn on_error(&mut self) -> Duration {
        let next = match self.current {
            Some(current) => (current * 2).min(ACCEPT_BACKOFF_MAX),
            None => ACCEPT_BACKOFF_MIN,
        };
        self.current = Some(next);
        next
    }

    fn is_backing_off(&self) -> bool {
        self.current.is_some()
    }

    fn reset(&mut self) {
        self.current = None;
    }
}

/// Reactor callbacks for the listening socket and every accepted connection.
struct ServerIo {
    shared: Arc<Shared>,
    listener: TcpListener,
    connections: HashMap<RawFd, Connection>,
    chunk: Vec<u8>,
    backoff: AcceptBackoff,
}

impl ServerIo {
    fn accept_one(&mut self, registry: &mut Registry) -> bool {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                self.backoff.reset();
                if let Err(err) = stream.set_nodelay(true) {
                    debug!(%addr, error = %err, "failed to set TCP_NODELAY");
                }
                let id = ConnectionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
                let conn = match Connection::new(id, stream, self.shared.config.frame_capacity) {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!(%addr, error = %err, "dropping accepted socket");
                        return true;
                    }
                };

                let fd = conn.fd();
                self.shared.connections().insert(id, conn.shared());
                registry.register(fd, Interest::Read);
                self.connections.insert(fd, conn);
                debug!(conn = %id, %addr, "accepted connection");
                true
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => false,
            Err(err) if err.kind() == ErrorKind::Interrupted => true,
            Err(err) => {
                let err = TransportError::Accept(err);
                let first = !self.backoff.is_backing_off();
                let pause = self.backoff.on_error();
                if first {
                    warn!(error = %err, "accept failed; backing off");
                } else {
                    debug!(error = %err, ?pause, "accept still failing");
                }
                thread::sleep(pause);
                false
            }
        }
    }

    fn drop_connection(&mut self, fd: RawFd, registry: &mut Registry) {
        registry.deregister(fd);
        if let Some(conn) = self.connections.remove(&fd) {
            self.shared.close(conn.id());
        }
    }
}

impl ReadyHandler for ServerIo {
    fn on_accept_ready(&mut self, _fd: RawFd, registry: &mut Registry) {
        while self.accept_one(registry) {}
    }

    fn on_read_ready(&mut self, fd: RawFd, registry: &mut Registry) {
        let Some(conn) = self.connections.get_mut(&fd) else {
            registry.deregister(fd);
            return;
        };

        // Closed from another thread; reap it without reading.
        if !self.shared.contains(conn.id()) {
            debug!(conn = %conn.id(), "reaping closed connection");
            self.drop_connection(fd, registry);
            return;
        }

        match conn.on_readable(&mut self.chunk, &self.shared.queue) {
            ReadStatus::Open => {}
            ReadStatus::Closed(reason) => {
                debug!(conn = %conn.id(), %reason, "closing connection");
                self.drop_connection(fd, registry);
            }
        }
    }
}

/// Listening endpoint serving many connections from one I/O thread.
///
/// Completed frames from every connection share one inbound queue and one
/// [`Dispatcher`]; handlers run on whichever thread calls
/// [`process`](Self::process).
pub struct Server {
    shared: Arc<Shared>,
    dispatcher: Dispatcher,
    io: Option<IoThread>,
    local_addr: Option<SocketAddr>,
    subsystem: Option<SubsystemGuard>,
}

impl Server {
    /// Create a server with default configuration.
    pub fn new() -> Self {
        Self::with_config(EndpointConfig::default())
    }

    /// Create a server with explicit configuration.
    pub fn with_config(config: EndpointConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                connections: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                queue: FrameQueue::new(config.queue),
                config,
            }),
            dispatcher: Dispatcher::new(),
            io: None,
            local_addr: None,
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

    /// Listen on every IPv4 interface at `port`.
    pub fn start(&mut self, port: u16, backlog: i32) -> Result<()> {
        self.start_on(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)), backlog)
    }

    /// Listen on `addr` and start the I/O thread.
    pub fn start_on(&mut self, addr: SocketAddr, backlog: i32) -> Result<()> {
        if self.io.is_some() {
            return Err(PeerError::AlreadyRunning);
        }

        let guard = subsystem::acquire()?;
        let listener = tcp::bind_listener(addr, backlog)?;
        let local_addr = listener.local_addr().map_err(TransportError::from)?;

        let mut reactor = Reactor::new()?;
        reactor
            .registry()
            .register(listener.as_raw_fd(), Interest::Accept);

        let handler = ServerIo {
            shared: Arc::clone(&self.shared),
            listener,
            connections: HashMap::new(),
            chunk: vec![0u8; self.shared.config.read_chunk_size.max(1)],
            backoff: AcceptBackoff::default(),
        };
        let io = IoThread::spawn("msgwire-server-io", reactor, handler)?;

        self.io = Some(io);
        self.local_addr = Some(local_addr);
        self.subsystem = Some(guard);
        info!(%local_addr, "server started");
        Ok(())
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Whether the I/O thread is running.
    pub fn is_running(&self) -> bool {
        self.io.is_some()
    }

    /// Dispatch every queued frame on the calling thread.
    ///
    /// Returns the number of frames whose handler ran.
    pub fn process(&mut self) -> usize {
        let frames = self.shared.queue.drain();
        self.dispatcher.dispatch_all(frames)
    }

    /// Like [`process`](Self::process), but waits up to `timeout` for the
    /// first frame when the queue is empty.
    pub fn process_timeout(&mut self, timeout: Duration) -> usize {
        let frames = self.shared.queue.wait_drain(timeout);
        self.dispatcher.dispatch_all(frames)
    }

    /// Write pre-encoded frame bytes to one connection.
    pub fn send_bytes(&self, id: ConnectionId, bytes: &[u8]) -> Result<()> {
        self.shared.send_bytes(id, bytes)
    }

    /// Encode and send `message` to one connection.
    pub fn send<T: Message>(&self, id: ConnectionId, message: &T) -> Result<()> {
        self.shared.send(id, message)
    }

    /// Send `message` to every open connection. Returns how many succeeded.
    pub fn broadcast<T: Message>(&self, message: &T) -> Result<usize> {
        self.shared.broadcast(message)
    }

    /// Number of currently open connections.
    pub fn get_conn_num(&self) -> usize {
        self.shared.connections().len()
    }

    /// Ids of the currently open connections, ascending.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.shared.connections().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Close one connection. A no-op if `id` is not open.
    pub fn on_stop_connect(&self, id: ConnectionId) {
        if self.shared.close(id) {
            info!(conn = %id, "connection closed by server");
        }
    }

    /// A cloneable handle for sending from inside handlers or other threads.
    pub fn sender(&self) -> ServerSender {
        ServerSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Inbound queue shared with the I/O thread.
    pub fn queue(&self) -> &FrameQueue {
        &self.shared.queue
    }

    /// Frames discarded by the inbound queue's overflow policy.
    pub fn dropped_frames(&self) -> u64 {
        self.shared.queue.dropped()
    }

    /// Stop listening, close every connection, and release handlers and
    /// queued frames. Idempotent.
    pub fn stop(&mut self) {
        let Some(mut io) = self.io.take() else {
            return;
        };
        io.stop();

        let closed = self.shared.close_all();
        self.shared.queue.clear();
        self.dispatcher.clear();
        self.subsystem = None;
        let local_addr = self.local_addr.take();
        info!(?local_addr, closed, "server stopped");
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .field("connections", &self.get_conn_num())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// Cloneable send handle for a [`Server`].
///
/// Handlers registered on the server can capture one to reply from inside
/// [`Server::process`].
#[derive(Debug, Clone)]
pub struct ServerSender {
    shared: Arc<Shared>,
}

impl ServerSender {
    /// Write pre-encoded frame bytes to one connection.
    pub fn send_bytes(&self, id: ConnectionId, bytes: &[u8]) -> Result<()> {
        self.shared.send_bytes(id, bytes)
    }

    /// Encode and send `message` to one connection.
    pub fn send<T: Message>(&self, id: ConnectionId, message: &T) -> Result<()> {
        self.shared.send(id, message)
    }

    /// Send `message` to every open connection.
    pub fn broadcast<T: Message>(&self, message: &T) -> Result<usize> {
        self.shared.broadcast(message)
    }

    /// Close one connection. A no-op if `id` is not open.
    pub fn close(&self, id: ConnectionId) {
        self.shared.close(id);
    }

    /// Number of currently open connections.
    pub fn connection_count(&self) -> usize {
        self.shared.connections().len()
    }
}
