//! Centralized error types for the logger
//!
//! All logger errors are represented by the `LogError` enum.
//! Use `Result<T>` as shorthand for `std::result::Result<T, LogError>`.

use std::fmt;
use std::path::PathBuf;

/// All logger errors
#[derive(Debug)]
pub enum LogError {
    // === Input validation ===
    /// Module name was empty
    EmptyModule,
    /// Module was registered twice
    ModuleExists { module: String },
    /// Module was never registered
    UnknownModule { module: String },
    /// Module path has a `.`/`..` segment or a backslash
    InvalidModule { module: String },
    /// Native-call trace without a function name
    EmptyFunctionName,
    /// Type-tag string contains a character with no rendering rule
    UnrecognizedTag { tag: char, position: usize },
    /// Fewer raw parameters than type tags
    MissingParameter { position: usize },
    /// A string/reference cell could not be resolved in VM memory
    UnresolvedCell { tag: char, position: usize },

    // === Startup ===
    /// Timestamp template rejected by the formatter
    InvalidTimeFormat { format: String },
    /// Crash handler could not be installed
    CrashHandler { reason: String },

    // === Lifecycle ===
    /// Service has not been initialized (or was torn down)
    NotRunning,
    /// Pipeline queue no longer accepts messages
    QueueClosed,
    /// Queue lock not acquired in time (fault context)
    QueueBusy,

    // === IO ===
    /// File system operation failed
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to read config file
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Invalid config value
    ConfigValidation { field: &'static str, reason: String },
}

impl LogError {
    /// True for errors caused by caller input (never enqueued)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyModule
                | Self::UnknownModule { .. }
                | Self::InvalidModule { .. }
                | Self::EmptyFunctionName
                | Self::UnrecognizedTag { .. }
                | Self::MissingParameter { .. }
                | Self::UnresolvedCell { .. }
        )
    }
}

impl std::error::Error for LogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } | Self::ConfigRead { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyModule => write!(f, "Module name is empty"),
            Self::ModuleExists { module } => write!(f, "Module \"{}\" already exists", module),
            Self::UnknownModule { module } => write!(f, "Module \"{}\" is not registered", module),
            Self::InvalidModule { module } => {
                write!(f, "Module \"{}\" is not a valid relative path", module)
            }
            Self::EmptyFunctionName => write!(f, "Function name is empty"),
            Self::UnrecognizedTag { tag, position } => {
                write!(f, "Unrecognized format tag '{}' at position {}", tag, position)
            }
            Self::MissingParameter { position } => {
                write!(f, "Missing parameter for format tag at position {}", position)
            }
            Self::UnresolvedCell { tag, position } => write!(
                f,
                "Cannot resolve '{}' parameter at position {}",
                tag, position
            ),
            Self::InvalidTimeFormat { format } => write!(f, "Invalid time format: {}", format),
            Self::CrashHandler { reason } => write!(f, "Crash handler error: {}", reason),
            Self::NotRunning => write!(f, "Log service is not running"),
            Self::QueueClosed => write!(f, "Log queue is closed"),
            Self::QueueBusy => write!(f, "Log queue is busy"),
            Self::Io { path, .. } => write!(f, "IO error: {}", path.display()),
            Self::ConfigRead { path, .. } => write!(f, "Cannot read config: {}", path.display()),
            Self::ConfigValidation { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
        }
    }
}

/// Alias for Result with LogError
pub type Result<T> = std::result::Result<T, LogError>;
