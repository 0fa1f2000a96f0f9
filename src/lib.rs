//! modlog - asynchronous per-module file logger with fatal-signal capture
//!
//! Producers on any thread queue messages; one writer thread timestamps
//! them and appends them to `logs/<module>.log`, plus `warnings.log` /
//! `errors.log` for matching levels. A crash handler turns fatal signals
//! and exceptions into a final FATAL record before default handling runs.
//!
//! ```no_run
//! use modlog::{config::Config, LogLevel, LogService};
//!
//! let service = LogService::new(Config::default());
//! service.init()?;
//!
//! let logger = service.register_plugin("mysql")?;
//! logger.log(LogLevel::Warning, "connection lost, retrying")?;
//!
//! service.exit();
//! # Ok::<(), modlog::LogError>(())
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod crash;
pub mod error;
pub mod logging;
pub mod manager;
pub mod trace;

pub use error::{LogError, Result};
pub use logging::{CallFrame, LevelMask, LogLevel, Message};
pub use manager::{LogService, Logger};
pub use trace::{CellMemory, NoMemory, ParamCell, VmMemory};
