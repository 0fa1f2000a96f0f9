//! Application-wide constants
//!
//! Centralized constants to avoid duplication and ensure consistency.

// =============================================================================
// Files
// =============================================================================

/// Default root directory for all log files
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Extension appended to every module path
pub const LOG_FILE_EXTENSION: &str = "log";

/// Aggregate file collecting WARNING messages from all modules
pub const WARNINGS_FILE_NAME: &str = "warnings.log";

/// Aggregate file collecting ERROR messages from all modules
pub const ERRORS_FILE_NAME: &str = "errors.log";

// =============================================================================
// Formatting
// =============================================================================

/// Default timestamp template (locale date + locale time)
pub const DEFAULT_TIME_FORMAT: &str = "%x %X";

/// Characters stripped from a configured timestamp template
pub const TIME_FORMAT_STRIPPED_CHARS: &[char] = &['[', ']', '(', ')'];

/// Separator between call frames in a trace suffix
pub const FRAME_SEPARATOR: &str = " -> ";

/// Placeholder rendered for censored parameters
pub const CENSORED_PLACEHOLDER: &str = "\"*****\"";

/// Placeholder rendered for a level outside the known set
pub const UNKNOWN_LEVEL_NAME: &str = "<unknown>";

// =============================================================================
// Modules
// =============================================================================

/// Module path prefix for plugin loggers
pub const PLUGIN_MODULE_PREFIX: &str = "plugins/";

/// Default module receiving fault records
pub const DEFAULT_CRASH_MODULE: &str = "crash";

// =============================================================================
// Timing
// =============================================================================

/// Upper bound on waiting for a fault record to reach disk (milliseconds)
pub const DEFAULT_FATAL_FLUSH_TIMEOUT_MS: u64 = 2000;

// =============================================================================
// Threads
// =============================================================================

/// Name of the pipeline consumer thread
pub const WRITER_THREAD_NAME: &str = "modlog-writer";
