//! Unix fault hooks (`sigaction`)

use libc::{c_int, c_void, siginfo_t};
use parking_lot::{const_mutex, Mutex};
use std::{io, mem, ptr};

use super::{handle_fault, Disposition, Fault, FATAL_SIGNALS, FAULT_LOCK_TIMEOUT};
use crate::error::{LogError, Result};

/// Handler that was installed for a signal before ours
struct SavedAction(c_int, libc::sigaction);

// SAFETY: `sigaction` is plain data (handler address, mask, flags); it is only
// passed back to the kernel.
unsafe impl Send for SavedAction {}

static PREVIOUS: Mutex<Vec<SavedAction>> = const_mutex(Vec::new());

/// Nothing process-wide beyond the signal handlers on Unix
pub(super) fn install_process_hooks() -> Result<()> {
    Ok(())
}

/// Install `on_fatal_signal` for every fatal signal.
///
/// The previous handlers are recorded only by the first installation after
/// startup or a restore, so a reinstall never saves our own handler.
pub(super) fn install_signal_handlers() -> Result<()> {
    let mut saved = PREVIOUS.lock();
    let record = saved.is_empty();

    for signal in FATAL_SIGNALS {
        // SAFETY: zeroed sigaction is a valid "no handler" value; every
        // pointer handed to sigaction outlives the call.
        let previous = unsafe {
            let mut action: libc::sigaction = mem::zeroed();
            action.sa_sigaction = on_fatal_signal as usize as libc::sighandler_t;
            // No SA_ONSTACK: the alternate stack std gives each thread is far
            // too small for a stack capture
            action.sa_flags = libc::SA_SIGINFO;
            libc::sigemptyset(&mut action.sa_mask);

            let mut previous: libc::sigaction = mem::zeroed();
            if libc::sigaction(signal, &action, &mut previous) != 0 {
                return Err(LogError::CrashHandler {
                    reason: format!(
                        "sigaction({}) failed: {}",
                        signal,
                        io::Error::last_os_error()
                    ),
                });
            }
            previous
        };
        if record {
            saved.push(SavedAction(signal, previous));
        }
    }
    Ok(())
}

/// Reinstall the recorded handlers (SIG_DFL if none were recorded)
pub(super) fn restore_default_handling() {
    let Some(mut saved) = PREVIOUS.try_lock_for(FAULT_LOCK_TIMEOUT) else {
        reset_to_default();
        return;
    };
    if saved.is_empty() {
        return;
    }
    for SavedAction(signal, previous) in saved.drain(..) {
        // SAFETY: `previous` came from the kernel for this very signal.
        unsafe {
            libc::sigaction(signal, &previous, ptr::null_mut());
        }
    }
}

fn reset_to_default() {
    for signal in FATAL_SIGNALS {
        // SAFETY: SIG_DFL is always a valid disposition.
        unsafe {
            libc::signal(signal, libc::SIG_DFL);
        }
    }
}

/// Current handler address for `signal` (`libc::SIG_DFL` = 0)
pub fn signal_disposition(signal: i32) -> Option<usize> {
    // SAFETY: a null new action only queries the current one.
    unsafe {
        let mut current: libc::sigaction = mem::zeroed();
        if libc::sigaction(signal, ptr::null(), &mut current) != 0 {
            return None;
        }
        Some(current.sa_sigaction as usize)
    }
}

extern "C" fn on_fatal_signal(signal: c_int, _info: *mut siginfo_t, _context: *mut c_void) {
    if let Disposition::Reraise(signal) = handle_fault(Fault::Signal(signal)) {
        // Delivered with the restored disposition once this handler returns
        // SAFETY: raise has no memory preconditions.
        unsafe {
            libc::raise(signal);
        }
    }
}
