use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Create a non-blocking listening socket with address reuse enabled.
///
/// Unlike [`TcpListener::bind`], the listen backlog is caller-controlled.
pub fn bind_listener(addr: SocketAddr, backlog: i32) -> Result<TcpListener> {
    let bind_err = |source: std::io::Error| TransportError::Bind { addr, source };

    let domain = match addr {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    };
    #[cfg(any(target_os = "linux", target_os = "android"))]
    let socket_type = libc::SOCK_STREAM | libc::SOCK_CLOEXEC;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    let socket_type = libc::SOCK_STREAM;

    // SAFETY: plain socket(2) call; the result is checked before use.
    let raw = unsafe { libc::socket(domain, socket_type, 0) };
    if raw < 0 {
        return Err(bind_err(std::io::Error::last_os_error()));
    }
    // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    let enable: libc::c_int = 1;
    // SAFETY: `enable` outlives the call and its size is passed explicitly.
    let rc = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            (&enable as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(bind_err(std::io::Error::last_os_error()));
    }

    let (storage, len) = socket_addr_to_raw(&addr);
    // SAFETY: `storage` holds a sockaddr of the family matching `domain`,
    // initialized for `len` bytes.
    let rc = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            (&storage as *const libc::sockaddr_storage).cast::<libc::sockaddr>(),
            len,
        )
    };
    if rc != 0 {
        return Err(bind_err(std::io::Error::last_os_error()));
    }

    // SAFETY: `fd` is a bound stream socket.
    let rc = unsafe { libc::listen(fd.as_raw_fd(), backlog) };
    if rc != 0 {
        return Err(bind_err(std::io::Error::last_os_error()));
    }

    let listener = TcpListener::from(fd);
    listener.set_nonblocking(true).map_err(bind_err)?;

    info!(%addr, backlog, "listening on tcp socket");
    Ok(listener)
}

fn socket_addr_to_raw(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    // SAFETY: sockaddr_storage is plain old data; all-zero is a valid value.
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };

    let len = match addr {
        SocketAddr::V4(v4) => {
            // SAFETY: sockaddr_storage is large and aligned enough for sockaddr_in.
            let sin = unsafe {
                &mut *(&mut storage as *mut libc::sockaddr_storage).cast::<libc::sockaddr_in>()
            };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
            std::mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            // SAFETY: sockaddr_storage is large and aligned enough for sockaddr_in6.
            let sin6 = unsafe {
                &mut *(&mut storage as *mut libc::sockaddr_storage).cast::<libc::sockaddr_in6>()
            };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_addr.s6_addr = v6.ip().octets();
            sin6.sin6_flowinfo = v6.flowinfo();
            sin6.sin6_scope_id = v6.scope_id();
            std::mem::size_of::<libc::sockaddr_in6>()
        }
    };

    (storage, len as libc::socklen_t)
}

/// Resolve `host:port` and connect to the first address that accepts.
///
/// The connect itself is blocking (bounded by `timeout` when given); the
/// returned stream is switched to non-blocking mode with `TCP_NODELAY` set.
pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream> {
    let target = format!("{host}:{port}");
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            target: target.clone(),
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(TransportError::Resolve {
            target,
            source: std::io::Error::new(ErrorKind::NotFound, "no addresses resolved"),
        });
    }

    let mut last_err = None;
    for addr in addrs {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                stream.set_nonblocking(true)?;
                debug!(%addr, "connected to tcp peer");
                return Ok(stream);
            }
            Err(err) => {
                debug!(%addr, error = %err, "connect attempt failed");
                last_err = Some(err);
            }
        }
    }

    Err(TransportError::Connect {
        target,
        source: last_err
            .unwrap_or_else(|| std::io::Error::new(ErrorKind::NotConnected, "no address accepted")),
    })
}

/// Write all of `buf` to a non-blocking stream, waiting for writability as
/// needed. `timeout` bounds the total time spent waiting.
pub fn write_all(stream: &TcpStream, buf: &[u8], timeout: Option<Duration>) -> Result<()> {
    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let mut writer = stream;
    let mut offset = 0usize;

    while offset < buf.len() {
        match writer.write(&buf[offset..]) {
            Ok(0) => return Err(TransportError::ConnectionClosed),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                wait_writable(stream.as_raw_fd(), deadline)?;
            }
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    Ok(())
}

fn wait_writable(fd: RawFd, deadline: Option<Instant>) -> Result<()> {
    loop {
        let timeout_ms = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Err(std::io::Error::from(ErrorKind::TimedOut).into());
                }
                i32::try_from(left.as_millis().max(1)).unwrap_or(i32::MAX)
            }
            None => -1,
        };

        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLOUT,
            revents: 0,
        };
        // SAFETY: `pfd` is a single valid pollfd for the duration of the call.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            return Err(err.into());
        }
        if rc > 0 {
            // POLLERR/POLLHUP surface through the next write() call.
            return Ok(());
        }
    }
}

/// How a call to [`read_available`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// All currently available bytes were consumed.
    Drained(usize),
    /// The peer closed its side of the connection.
    Eof(usize),
    /// The byte sink asked to stop reading.
    Stopped(usize),
}

impl ReadOutcome {
    /// Total bytes handed to the sink.
    pub fn bytes(self) -> usize {
        match self {
            Self::Drained(n) | Self::Eof(n) | Self::Stopped(n) => n,
        }
    }
}

/// Read everything currently available on a non-blocking stream.
///
/// Each chunk is passed to `sink`; returning `false` stops reading early.
pub fn read_available<F>(stream: &TcpStream, chunk: &mut [u8], mut sink: F) -> Result<ReadOutcome>
where
    F: FnMut(&[u8]) -> bool,
{
    let mut reader = stream;
    let mut total = 0usize;

    loop {
        match reader.read(chunk) {
            Ok(0) => return Ok(ReadOutcome::Eof(total)),
            Ok(n) => {
                total += n;
                if !sink(&chunk[..n]) {
                    return Ok(ReadOutcome::Stopped(total));
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                return Ok(ReadOutcome::Drained(total));
            }
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}
