//! Process-wide socket subsystem state.
//!
//! The subsystem is active while either the host application holds it
//! (between [`init`] and [`teardown`]) or at least one [`SubsystemGuard`] is
//! alive. Endpoints acquire a guard for their lifetime, so hosts that never
//! call [`init`] still get a working socket layer. Both calls are idempotent.
//!
//! On Unix, activation ignores `SIGPIPE` so that writing to a reset peer
//! surfaces as an `EPIPE` error instead of terminating the process; the
//! previous disposition is restored when the subsystem deactivates.

use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::Result;

struct State {
    host: bool,
    guards: usize,
    active: bool,
    #[cfg(unix)]
    previous_sigpipe: Option<libc::sighandler_t>,
}

static STATE: Mutex<State> = Mutex::new(State {
    host: false,
    guards: 0,
    active: false,
    #[cfg(unix)]
    previous_sigpipe: None,
});

fn lock() -> MutexGuard<'static, State> {
    STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Initialize the socket subsystem on behalf of the host application.
///
/// Calling this more than once has no further effect.
pub fn init() -> Result<()> {
    let mut state = lock();
    activate(&mut state)?;
    state.host = true;
    Ok(())
}

/// Release the host application's hold on the socket subsystem.
///
/// The subsystem is deactivated once no endpoint guard remains. Calling this
/// without a matching [`init`] is a no-op.
pub fn teardown() {
    let mut state = lock();
    state.host = false;
    deactivate_if_idle(&mut state);
}

/// Whether the socket subsystem is currently active.
pub fn is_initialized() -> bool {
    lock().active
}

/// Acquire a guard that keeps the subsystem active until dropped.
pub fn acquire() -> Result<SubsystemGuard> {
    let mut state = lock();
    activate(&mut state)?;
    state.guards += 1;
    Ok(SubsystemGuard { _private: () })
}

/// Keeps the socket subsystem active for an endpoint's lifetime.
#[derive(Debug)]
pub struct SubsystemGuard {
    _private: (),
}

impl Drop for SubsystemGuard {
    fn drop(&mut self) {
        let mut state = lock();
        state.guards = state.guards.saturating_sub(1);
        deactivate_if_idle(&mut state);
    }
}

fn activate(state: &mut State) -> Result<()> {
    if state.active {
        return Ok(());
    }

    #[cfg(unix)]
    {
        // SAFETY: installing SIG_IGN for SIGPIPE has no handler code to run and
        // is async-signal-safe; the previous disposition is kept for restore.
        let previous = unsafe { libc::signal(libc::SIGPIPE, libc::SIG_IGN) };
        if previous == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error().into());
        }
        state.previous_sigpipe = Some(previous);
    }

    state.active = true;
    debug!("socket subsystem initialized");
    Ok(())
}

fn deactivate_if_idle(state: &mut State) {
    if !state.active || state.host || state.guards > 0 {
        return;
    }

    #[cfg(unix)]
    if let Some(previous) = state.previous_sigpipe.take() {
        // SAFETY: restores the disposition returned by the matching signal() call.
        unsafe {
            libc::signal(libc::SIGPIPE, previous);
        }
    }

    state.active = false;
    debug!("socket subsystem torn down");
}
