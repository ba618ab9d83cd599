use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::Result;

/// Readiness a registered socket is watched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// A listening socket with connections waiting to be accepted.
    Accept,
    /// A connected socket with bytes (or EOF, or an error) to read.
    Read,
}

/// Receives readiness events from [`Reactor::dispatch`].
///
/// Hang-up and error conditions are delivered as read readiness so the read
/// path observes EOF or the pending socket error itself.
pub trait ReadyHandler {
    /// A listening socket registered with [`Interest::Accept`] is ready.
    fn on_accept_ready(&mut self, fd: RawFd, registry: &mut Registry);

    /// A socket registered with [`Interest::Read`] is ready.
    fn on_read_ready(&mut self, fd: RawFd, registry: &mut Registry);
}

/// The set of sockets a reactor watches.
#[derive(Debug, Default)]
pub struct Registry {
    interests: HashMap<RawFd, Interest>,
}

impl Registry {
    /// Watch `fd` for `interest`, replacing any previous interest.
    pub fn register(&mut self, fd: RawFd, interest: Interest) {
        trace!(fd, ?interest, "register");
        self.interests.insert(fd, interest);
    }

    /// Stop watching `fd`. Returns the interest it was registered with.
    pub fn deregister(&mut self, fd: RawFd) -> Option<Interest> {
        trace!(fd, "deregister");
        self.interests.remove(&fd)
    }

    /// Current interest for `fd`, if registered.
    pub fn interest(&self, fd: RawFd) -> Option<Interest> {
        self.interests.get(&fd).copied()
    }

    /// Number of registered sockets.
    pub fn len(&self) -> usize {
        self.interests.len()
    }

    /// Whether no socket is registered.
    pub fn is_empty(&self) -> bool {
        self.interests.is_empty()
    }
}

struct Shared {
    stopped: AtomicBool,
    waker: UnixStream,
}

/// Cloneable, thread-safe handle used to stop a running reactor.
#[derive(Clone)]
pub struct ReactorHandle {
    shared: Arc<Shared>,
}

impl ReactorHandle {
    /// Signal the reactor to stop. Idempotent; safe from any thread.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        // A full wake pipe already guarantees a pending wakeup.
        if let Err(err) = (&self.shared.waker).write(&[1]) {
            if err.kind() != ErrorKind::WouldBlock {
                warn!(error = %err, "failed to wake reactor");
            }
        }
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ReactorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactorHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Level-triggered readiness reactor over `poll(2)`.
///
/// The reactor is driven by exactly one thread; [`ReactorHandle`] is the only
/// piece meant to cross threads.
pub struct Reactor {
    registry: Registry,
    shared: Arc<Shared>,
    wake_rx: UnixStream,
    pollfds: Vec<libc::pollfd>,
    ready: Vec<(RawFd, Interest)>,
}

impl Reactor {
    /// Create a reactor with an empty registry.
    pub fn new() -> Result<Self> {
        let (waker, wake_rx) = UnixStream::pair()?;
        waker.set_nonblocking(true)?;
        wake_rx.set_nonblocking(true)?;

        Ok(Self {
            registry: Registry::default(),
            shared: Arc::new(Shared {
                stopped: AtomicBool::new(false),
                waker,
            }),
            wake_rx,
            pollfds: Vec::new(),
            ready: Vec::new(),
        })
    }

    /// A handle that can stop this reactor from another thread.
    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// The set of watched sockets.
    pub fn registry(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Run the dispatch loop until [`ReactorHandle::stop`] is called.
    pub fn dispatch<H: ReadyHandler>(&mut self, handler: &mut H) -> Result<()> {
        debug!("reactor dispatch loop started");
        while !self.shared.stopped.load(Ordering::SeqCst) {
            self.poll_once(handler, None)?;
        }
        debug!("reactor dispatch loop stopped");
        Ok(())
    }

    /// Wait for readiness once and deliver the resulting events.
    ///
    /// `timeout` of `None` waits until an event or a stop request arrives.
    /// Returns the number of events delivered to `handler`.
    pub fn poll_once<H: ReadyHandler>(
        &mut self,
        handler: &mut H,
        timeout: Option<Duration>,
    ) -> Result<usize> {
        self.pollfds.clear();
        self.pollfds.push(libc::pollfd {
            fd: self.wake_rx.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        });
        for &fd in self.registry.interests.keys() {
            self.pollfds.push(libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            });
        }

        let timeout_ms = match timeout {
            Some(timeout) => i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX),
            None => -1,
        };

        // SAFETY: `pollfds` is a valid, initialized slice of `pollfd` for the
        // duration of the call and its length is passed alongside the pointer.
        let rc = unsafe {
            libc::poll(
                self.pollfds.as_mut_ptr(),
                self.pollfds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err.into());
        }
        if rc == 0 {
            return Ok(0);
        }

        if self.pollfds[0].revents != 0 {
            self.drain_waker();
        }

        self.ready.clear();
        for pfd in &self.pollfds[1..] {
            if pfd.revents == 0 {
                continue;
            }
            if pfd.revents & libc::POLLNVAL != 0 {
                warn!(fd = pfd.fd, "socket closed while still registered; dropping");
                self.registry.interests.remove(&pfd.fd);
                continue;
            }
            if let Some(interest) = self.registry.interest(pfd.fd) {
                self.ready.push((pfd.fd, interest));
            }
        }

        let mut delivered = 0usize;
        let ready = std::mem::take(&mut self.ready);
        for &(fd, interest) in &ready {
            // An earlier handler in this round may have closed this socket.
            if self.registry.interest(fd) != Some(interest) {
                continue;
            }
            match interest {
                Interest::Accept => handler.on_accept_ready(fd, &mut self.registry),
                Interest::Read => handler.on_read_ready(fd, &mut self.registry),
            }
            delivered += 1;
        }
        self.ready = ready;

        Ok(delivered)
    }

    fn drain_waker(&mut self) {
        let mut buf = [0u8; 64];
        loop {
            match self.wake_rx.read(&mut buf) {
                Ok(0) => return,
                Ok(_) => continue,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return,
            }
        }
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("registered", &self.registry.len())
            .field("stopped", &self.shared.stopped.load(Ordering::SeqCst))
            .finish()
    }
}
