use std::thread::{self, JoinHandle};

use msgwire_transport::{Reactor, ReactorHandle, ReadyHandler};
use tracing::{debug, error};

use crate::error::{PeerError, Result};

/// Background thread driving one reactor.
pub(crate) struct IoThread {
    handle: ReactorHandle,
    join: Option<JoinHandle<()>>,
}

impl IoThread {
    /// Move `reactor` and `handler` onto a new named thread and start dispatching.
    pub(crate) fn spawn<H>(name: &str, mut reactor: Reactor, mut handler: H) -> Result<Self>
    where
        H: ReadyHandler + Send + 'static,
    {
        let handle = reactor.handle();
        let thread_name = name.to_string();
        let join = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!(thread = %thread_name, "I/O thread started");
                if let Err(err) = reactor.dispatch(&mut handler) {
                    error!(thread = %thread_name, error = %err, "I/O thread failed");
                }
                debug!(thread = %thread_name, "I/O thread exiting");
            })
            .map_err(PeerError::Thread)?;

        Ok(Self {
            handle,
            join: Some(join),
        })
    }

    /// Stop the reactor and wait for the thread to exit. Idempotent.
    pub(crate) fn stop(&mut self) {
        self.handle.stop();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("I/O thread panicked");
            }
        }
    }
}

impl Drop for IoThread {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for IoThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoThread")
            .field("running", &self.join.is_some())
            .finish()
    }
}
