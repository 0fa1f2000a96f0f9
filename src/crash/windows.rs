//! Windows fault hooks
//!
//! Uses the official `windows` crate:
//! - a vectored exception handler (sees faults before any unwinding)
//! - an unhandled-exception filter (last chance)
//!
//! Plus CRT `signal()` handlers for the fatal signals. SIGSEGV, SIGILL and
//! SIGFPE handlers are per thread in the CRT, hence the per-thread install.

use libc::{c_int, sighandler_t};
use parking_lot::{const_mutex, Mutex};
use std::ffi::c_void;

use windows::Win32::System::Diagnostics::Debug::{
    AddVectoredExceptionHandler, RemoveVectoredExceptionHandler, SetUnhandledExceptionFilter,
    EXCEPTION_POINTERS, LPTOP_LEVEL_EXCEPTION_FILTER,
};

use super::{handle_fault, is_installed, Disposition, Fault, FATAL_SIGNALS, FAULT_LOCK_TIMEOUT};
use crate::error::{LogError, Result};

const EXCEPTION_CONTINUE_SEARCH: i32 = 0;

/// Register as the last vectored handler
const LAST_HANDLER: u32 = 0;

/// `signal()` failure value
const SIG_ERR: sighandler_t = !0;

struct Hooks {
    /// Handle from AddVectoredExceptionHandler (as address)
    vectored: usize,
    previous_filter: LPTOP_LEVEL_EXCEPTION_FILTER,
}

static HOOKS: Mutex<Option<Hooks>> = const_mutex(None);

/// CRT handlers in place before the first install
static PREVIOUS_SIGNALS: Mutex<Vec<(c_int, sighandler_t)>> = const_mutex(Vec::new());

pub(super) fn install_process_hooks() -> Result<()> {
    let mut hooks = HOOKS.lock();
    if hooks.is_some() {
        return Ok(());
    }

    // SAFETY: both callbacks are 'static functions with the expected ABI.
    let (vectored, previous_filter) = unsafe {
        let previous_filter = SetUnhandledExceptionFilter(Some(unexpected_exception));
        let vectored = AddVectoredExceptionHandler(LAST_HANDLER, Some(vectored_exception));
        (vectored, previous_filter)
    };
    if vectored.is_null() {
        // SAFETY: restoring the value we just replaced.
        unsafe {
            SetUnhandledExceptionFilter(previous_filter);
        }
        return Err(LogError::CrashHandler {
            reason: "AddVectoredExceptionHandler failed".to_string(),
        });
    }

    *hooks = Some(Hooks {
        vectored: vectored as usize,
        previous_filter,
    });
    Ok(())
}

/// Install `on_fatal_signal` through the CRT for the calling thread.
///
/// Only the first installation after startup or a restore records the
/// previous handlers.
pub(super) fn install_signal_handlers() -> Result<()> {
    let mut saved = PREVIOUS_SIGNALS.lock();
    let record = saved.is_empty();
    let handler = on_fatal_signal as extern "C" fn(c_int) as sighandler_t;

    for signal in FATAL_SIGNALS {
        // SAFETY: `on_fatal_signal` has the CRT handler ABI and is 'static.
        let previous = unsafe { libc::signal(signal, handler) };
        if previous == SIG_ERR {
            return Err(LogError::CrashHandler {
                reason: format!("signal({}) failed", signal),
            });
        }
        if record {
            saved.push((signal, previous));
        }
    }
    Ok(())
}

pub(super) fn restore_default_handling() {
    if let Some(mut hooks) = HOOKS.try_lock_for(FAULT_LOCK_TIMEOUT) {
        if let Some(hooks) = hooks.take() {
            // SAFETY: handle and filter were obtained from the matching Add/Set.
            unsafe {
                SetUnhandledExceptionFilter(hooks.previous_filter);
                RemoveVectoredExceptionHandler(hooks.vectored as *const c_void);
            }
        }
    }

    match PREVIOUS_SIGNALS.try_lock_for(FAULT_LOCK_TIMEOUT) {
        Some(mut saved) => {
            for (signal, previous) in saved.drain(..) {
                // SAFETY: `previous` was returned by signal() for this signal.
                unsafe {
                    libc::signal(signal, previous);
                }
            }
        }
        None => {
            for signal in FATAL_SIGNALS {
                // SAFETY: SIG_DFL is always a valid disposition.
                unsafe {
                    libc::signal(signal, libc::SIG_DFL);
                }
            }
        }
    }
}

extern "C" fn on_fatal_signal(signal: c_int) {
    // A thread still carrying a per-thread handler after a restore
    if !is_installed() {
        // SAFETY: SIG_DFL is always valid; raise has no memory preconditions.
        unsafe {
            libc::signal(signal, libc::SIG_DFL);
            libc::raise(signal);
        }
        return;
    }
    if let Disposition::Reraise(signal) = handle_fault(Fault::Signal(signal)) {
        // SAFETY: raise has no memory preconditions.
        unsafe {
            libc::raise(signal);
        }
    }
}

fn exception_code(info: *const EXCEPTION_POINTERS) -> Option<u32> {
    // SAFETY: the OS passes valid pointers (or null) to exception callbacks.
    unsafe {
        let record = info.as_ref()?.ExceptionRecord.as_ref()?;
        Some(record.ExceptionCode.0 as u32)
    }
}

unsafe extern "system" fn vectored_exception(info: *mut EXCEPTION_POINTERS) -> i32 {
    if let Some(code) = exception_code(info) {
        handle_fault(Fault::Exception {
            code,
            handler: "Vectored Exception Handler",
        });
    }
    EXCEPTION_CONTINUE_SEARCH
}

unsafe extern "system" fn unexpected_exception(info: *const EXCEPTION_POINTERS) -> i32 {
    if let Some(code) = exception_code(info) {
        handle_fault(Fault::Exception {
            code,
            handler: "Unexpected Exception Handler",
        });
    }
    EXCEPTION_CONTINUE_SEARCH
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crash::SIGFPE;

    #[test]
    fn test_crt_handlers_installed_then_restored() {
        let ours = on_fatal_signal as extern "C" fn(c_int) as sighandler_t;

        install_signal_handlers().unwrap();
        // signal() hands back the handler it replaces
        // SAFETY: swaps our own handler for itself.
        let current = unsafe { libc::signal(SIGFPE, ours) };
        assert_eq!(current, ours);

        restore_default_handling();
        // SAFETY: SIG_DFL is always a valid disposition.
        let current = unsafe { libc::signal(SIGFPE, libc::SIG_DFL) };
        assert_ne!(current, ours);
    }
}
