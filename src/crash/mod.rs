//! Fatal signal / exception capture
//!
//! Two fault classes, one transition function ([`handle_fault`]):
//!
//! - **Signal** (SIGABRT, SIGFPE, SIGSEGV, SIGILL, SIGTERM): capture the
//!   stack, queue a FATAL record, restore the previous handlers, then the
//!   OS callback re-raises so the default action (core dump / exit) runs.
//! - **Exception** (Windows vectored / unhandled filters): unknown codes are
//!   declined. Known codes restore default handling first, queue a FATAL
//!   record and let the OS continue its handler search.
//!
//! Handlers are process-wide but signal handlers are (re)installed per
//! thread on first use, tracked by a thread-local generation number. A
//! restore bumps the generation so every thread installs again afterwards.
//!
//! Every lock taken from a fault context has a timeout: the interrupted
//! code may hold it on the same thread. A fault on the queue consumer
//! writes its record directly instead of waiting for itself.
//!
//! Platform code lives in `unix.rs` / `windows.rs`; this module has no OS
//! calls of its own.

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
use self::unix as platform;
#[cfg(windows)]
use self::windows as platform;

use parking_lot::{const_mutex, Mutex};
use std::backtrace::Backtrace;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Result;
use crate::logging::{DirectWriter, LogLevel, LogQueue, Message};

#[cfg(unix)]
pub use self::unix::signal_disposition;

// =============================================================================
// Signals and exception codes
// =============================================================================

pub use libc::{SIGABRT, SIGFPE, SIGILL, SIGSEGV, SIGTERM};

/// Signals intercepted by the crash handler
pub const FATAL_SIGNALS: [i32; 5] = [SIGABRT, SIGFPE, SIGSEGV, SIGILL, SIGTERM];

/// Exception codes treated as fatal (anything else is declined)
pub const KNOWN_EXCEPTIONS: [(u32, &str); 19] = [
    (0xC000_0005, "EXCEPTION_ACCESS_VIOLATION"),
    (0xC000_008C, "EXCEPTION_ARRAY_BOUNDS_EXCEEDED"),
    (0x8000_0003, "EXCEPTION_BREAKPOINT"),
    (0x8000_0002, "EXCEPTION_DATATYPE_MISALIGNMENT"),
    (0xC000_008D, "EXCEPTION_FLT_DENORMAL_OPERAND"),
    (0xC000_008E, "EXCEPTION_FLT_DIVIDE_BY_ZERO"),
    (0xC000_008F, "EXCEPTION_FLT_INEXACT_RESULT"),
    (0xC000_0090, "EXCEPTION_FLT_INVALID_OPERATION"),
    (0xC000_0091, "EXCEPTION_FLT_OVERFLOW"),
    (0xC000_0092, "EXCEPTION_FLT_STACK_CHECK"),
    (0xC000_0093, "EXCEPTION_FLT_UNDERFLOW"),
    (0xC000_001D, "EXCEPTION_ILLEGAL_INSTRUCTION"),
    (0xC000_0006, "EXCEPTION_IN_PAGE_ERROR"),
    (0xC000_0094, "EXCEPTION_INT_DIVIDE_BY_ZERO"),
    (0xC000_0095, "EXCEPTION_INT_OVERFLOW"),
    (0xC000_0026, "EXCEPTION_INVALID_DISPOSITION"),
    (0xC000_0025, "EXCEPTION_NONCONTINUABLE_EXCEPTION"),
    (0xC000_0096, "EXCEPTION_PRIV_INSTRUCTION"),
    (0xC000_00FD, "EXCEPTION_STACK_OVERFLOW"),
];

pub fn is_known_exception(code: u32) -> bool {
    KNOWN_EXCEPTIONS.iter().any(|(c, _)| *c == code)
}

// =============================================================================
// Fault model
// =============================================================================

/// A fault reported by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Signal(i32),
    Exception {
        code: u32,
        /// Which OS hook saw it ("Vectored Exception Handler", ...)
        handler: &'static str,
    },
}

/// What the OS callback must do after [`handle_fault`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Previous handlers are back; raise the signal again
    Reraise(i32),
    /// Record written (or skipped); continue the exception handler search
    ContinueSearch,
    /// Not a fault we handle; nothing was done
    Declined,
}

/// Symbolic name of a signal or exception
pub fn exit_reason_name(fault: Fault) -> String {
    match fault {
        Fault::Signal(n) => match n {
            SIGABRT => "SIGABRT".to_string(),
            SIGFPE => "SIGFPE".to_string(),
            SIGSEGV => "SIGSEGV".to_string(),
            SIGILL => "SIGILL".to_string(),
            SIGTERM => "SIGTERM".to_string(),
            _ => format!("UNKNOWN SIGNAL({})", n),
        },
        Fault::Exception { code, .. } => KNOWN_EXCEPTIONS
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| format!("UNKNOWN EXCEPTION(0x{:08X})", code)),
    }
}

/// Text of the FATAL record: header line, then the stack dump
pub fn fault_report(fault: Fault, dump: &str) -> String {
    let pid = std::process::id();
    let name = exit_reason_name(fault);
    match fault {
        Fault::Signal(n) => format!(
            "Received fatal signal {}({})\tPID: {}\n{}",
            name, n, pid, dump
        ),
        Fault::Exception { handler, .. } => format!(
            "{}: Received fatal exception {}\tPID: {}\n{}",
            handler, name, pid, dump
        ),
    }
}

// =============================================================================
// Stack capture
// =============================================================================

/// Produces a symbolic stack dump of the calling thread
pub trait StackCapture: Send + Sync {
    fn capture(&self) -> String;
}

/// Stack dump via the standard library unwinder
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeStackCapture;

impl StackCapture for NativeStackCapture {
    fn capture(&self) -> String {
        let dump = Backtrace::force_capture().to_string();
        if dump.trim().is_empty() {
            "<no stack frames>".to_string()
        } else {
            dump
        }
    }
}

// =============================================================================
// Process-wide state
// =============================================================================

/// Where fault records go
pub struct FaultTarget {
    pub queue: Arc<LogQueue>,
    pub module: String,
    /// Wait for the record to reach disk before resuming default handling
    pub block_on_fatal: bool,
    pub flush_timeout: Duration,
    /// Used instead of the queue when the fault hits the consumer thread
    pub direct: Option<DirectWriter>,
}

static TARGET: Mutex<Option<FaultTarget>> = const_mutex(None);
static STACK_CAPTURE: Mutex<Option<Arc<dyn StackCapture>>> = const_mutex(None);

static INSTALLED: AtomicBool = AtomicBool::new(false);
static HANDLING: AtomicBool = AtomicBool::new(false);
/// Bumped on every restore; threads compare against their own copy
static GENERATION: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_GENERATION: Cell<u64> = const { Cell::new(0) };
    static CONSUMER_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Locks taken from a fault context give up instead of deadlocking
const FAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(200);

/// Install all fault hooks for the process (idempotent).
///
/// Records the handlers already in place so they can be restored verbatim,
/// then installs the signal handlers for the calling thread.
pub fn install_crash_handler() -> Result<()> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    if let Err(e) = platform::install_process_hooks() {
        INSTALLED.store(false, Ordering::SeqCst);
        return Err(e);
    }
    if let Err(e) = install_signal_handler_for_thread() {
        platform::restore_default_handling();
        INSTALLED.store(false, Ordering::SeqCst);
        return Err(e);
    }
    debug!("crash handler installed");
    Ok(())
}

/// Install the fatal-signal handlers for the calling thread.
///
/// Safe to call repeatedly; returns true if this call installed them.
pub fn install_signal_handler_for_thread() -> Result<bool> {
    let generation = GENERATION.load(Ordering::SeqCst);
    if THREAD_GENERATION.with(Cell::get) == generation {
        return Ok(false);
    }
    platform::install_signal_handlers()?;
    THREAD_GENERATION.with(|g| g.set(generation));
    Ok(true)
}

pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::SeqCst)
}

/// Put back every handler that was in place before installation
pub fn restore_default_handling() {
    platform::restore_default_handling();
    INSTALLED.store(false, Ordering::SeqCst);
    GENERATION.fetch_add(1, Ordering::SeqCst);
}

/// Route fault records into `target`, returning the previous target
pub fn set_fault_target(target: FaultTarget) -> Option<FaultTarget> {
    TARGET.lock().replace(target)
}

/// Stop routing fault records into `queue` (the pipeline is going away).
///
/// A target installed later for another queue is left alone.
pub fn detach_fault_target(queue: &Arc<LogQueue>) -> bool {
    let mut target = TARGET.lock();
    match target.as_ref() {
        Some(current) if Arc::ptr_eq(&current.queue, queue) => {
            *target = None;
            true
        }
        _ => false,
    }
}

/// Mark the calling thread as the queue consumer.
///
/// A fault on that thread cannot wait for the queue to drain, so its record
/// goes through [`FaultTarget::direct`] instead.
pub fn mark_consumer_thread() {
    CONSUMER_THREAD.with(|c| c.set(true));
}

fn on_consumer_thread() -> bool {
    CONSUMER_THREAD.with(Cell::get)
}

/// Replace the stack dump provider (defaults to [`NativeStackCapture`])
pub fn set_stack_capture(capture: Arc<dyn StackCapture>) {
    *STACK_CAPTURE.lock() = Some(capture);
}

// =============================================================================
// Transition function
// =============================================================================

/// Handle one fault. Called by the OS callbacks on the faulting thread.
///
/// Does not raise or terminate by itself; the caller acts on the returned
/// [`Disposition`].
pub fn handle_fault(fault: Fault) -> Disposition {
    match fault {
        Fault::Signal(signal) => {
            if !HANDLING.swap(true, Ordering::SeqCst) {
                report(fault);
                HANDLING.store(false, Ordering::SeqCst);
            }
            restore_default_handling();
            Disposition::Reraise(signal)
        }
        Fault::Exception { code, .. } => {
            if !is_known_exception(code) {
                return Disposition::Declined;
            }
            // Before logging: a second fault must not come back here
            restore_default_handling();
            if !HANDLING.swap(true, Ordering::SeqCst) {
                report(fault);
                HANDLING.store(false, Ordering::SeqCst);
            }
            Disposition::ContinueSearch
        }
    }
}

fn report(fault: Fault) {
    let capture = STACK_CAPTURE
        .try_lock_for(FAULT_LOCK_TIMEOUT)
        .and_then(|c| c.clone());
    let dump = match capture {
        Some(capture) => capture.capture(),
        None => NativeStackCapture.capture(),
    };
    let text = fault_report(fault, &dump);

    let Some(target) = TARGET.try_lock_for(FAULT_LOCK_TIMEOUT) else {
        return;
    };
    let Some(target) = target.as_ref() else {
        return;
    };

    let message = Message::new(&target.module, LogLevel::Fatal, text, vec![]);

    if on_consumer_thread() {
        match &target.direct {
            Some(direct) => {
                if let Err(e) = direct.write(&message) {
                    warn!("cannot write fault record: {}", e);
                }
            }
            None => warn!("fault on the writer thread, record dropped"),
        }
        return;
    }

    match target.queue.try_push_for(message, FAULT_LOCK_TIMEOUT) {
        Ok(seq) => {
            if target.block_on_fatal && !target.queue.wait_processed(seq, target.flush_timeout) {
                warn!("fault record not flushed within {:?}", target.flush_timeout);
            }
        }
        Err(e) => warn!("cannot queue fault record: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_names() {
        assert_eq!(exit_reason_name(Fault::Signal(SIGSEGV)), "SIGSEGV");
        assert_eq!(exit_reason_name(Fault::Signal(SIGABRT)), "SIGABRT");
        assert_eq!(exit_reason_name(Fault::Signal(999)), "UNKNOWN SIGNAL(999)");
    }

    #[test]
    fn test_exception_names() {
        let fault = Fault::Exception {
            code: 0xC000_0005,
            handler: "Vectored Exception Handler",
        };
        assert_eq!(exit_reason_name(fault), "EXCEPTION_ACCESS_VIOLATION");

        let fault = Fault::Exception {
            code: 0xE06D_7363,
            handler: "Vectored Exception Handler",
        };
        assert_eq!(exit_reason_name(fault), "UNKNOWN EXCEPTION(0xE06D7363)");
    }

    #[test]
    fn test_known_exceptions() {
        assert!(is_known_exception(0xC000_00FD));
        assert!(is_known_exception(0x8000_0003));
        // C++ throw
        assert!(!is_known_exception(0xE06D_7363));
    }

    #[test]
    fn test_unknown_exception_is_declined() {
        let fault = Fault::Exception {
            code: 0x4001_0006,
            handler: "Vectored Exception Handler",
        };
        assert_eq!(handle_fault(fault), Disposition::Declined);
    }

    #[test]
    fn test_fault_report_layout() {
        let text = fault_report(Fault::Signal(SIGFPE), "frame0\nframe1");
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with(&format!("Received fatal signal SIGFPE({})", SIGFPE)));
        assert!(header.contains(&format!("PID: {}", std::process::id())));
        assert_eq!(lines.collect::<Vec<_>>(), vec!["frame0", "frame1"]);

        let text = fault_report(
            Fault::Exception {
                code: 0xC000_0094,
                handler: "Unexpected Exception Handler",
            },
            "dump",
        );
        assert!(text.starts_with(
            "Unexpected Exception Handler: Received fatal exception EXCEPTION_INT_DIVIDE_BY_ZERO"
        ));
    }

    #[test]
    fn test_native_capture_not_empty() {
        assert!(!NativeStackCapture.capture().trim().is_empty());
    }
}
