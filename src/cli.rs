//! Command-line interface definition using clap
//!
//! Provides structured argument parsing with automatic help generation.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::crash::{SIGABRT, SIGFPE, SIGILL, SIGSEGV, SIGTERM};
use crate::logging::LogLevel;

// =============================================================================
// CLI Definition
// =============================================================================

/// Per-module file logger with fatal-signal capture
#[derive(Parser, Debug)]
#[command(name = "modlog")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file (defaults apply when missing)
    #[arg(short, long, value_name = "FILE", default_value = "modlog.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write one message to a module file
    Log {
        module: String,
        #[arg(value_enum)]
        level: LevelArg,
        text: String,
        /// Call frame as FILE:LINE (repeatable)
        #[arg(long = "frame", value_name = "FILE:LINE")]
        frames: Vec<String>,
    },

    /// Write a native-call trace (integers and floats only)
    Native {
        module: String,
        name: String,
        /// One type tag per value (d, i, f, h, x, b, *, p)
        tags: String,
        #[arg(allow_negative_numbers = true)]
        values: Vec<String>,
    },

    /// Install the crash handler, then raise a fatal signal
    Crash {
        #[arg(value_enum, default_value_t = SignalArg::Abrt)]
        signal: SignalArg,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelArg {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl From<LevelArg> for LogLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Debug => LogLevel::Debug,
            LevelArg::Info => LogLevel::Info,
            LevelArg::Warning => LogLevel::Warning,
            LevelArg::Error => LogLevel::Error,
            LevelArg::Fatal => LogLevel::Fatal,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalArg {
    Abrt,
    Fpe,
    Segv,
    Ill,
    Term,
}

impl SignalArg {
    pub fn number(self) -> i32 {
        match self {
            SignalArg::Abrt => SIGABRT,
            SignalArg::Fpe => SIGFPE,
            SignalArg::Segv => SIGSEGV,
            SignalArg::Ill => SIGILL,
            SignalArg::Term => SIGTERM,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
