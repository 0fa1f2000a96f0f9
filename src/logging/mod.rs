//! Asynchronous log pipeline
//!
//! - `Message` - Immutable message handed to the queue
//! - `LogQueue` - FIFO shared by producers and the writer thread
//! - `ModuleFileRegistry` - Per-module files, owned by the writer
//! - `LogPipeline` - Writer thread, aggregate files and line formatting

pub mod entry;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod timestamp;

pub use entry::{level_name, CallFrame, LevelMask, LogLevel, Message};
pub use pipeline::{format_line, DirectWriter, LogPipeline, PipelineStats};
pub use queue::{LogQueue, Sequence};
pub use registry::{validate_module_name, ModuleFileRegistry};
pub use timestamp::TimestampFormat;

/// Initialize tracing for the logger's own diagnostics
///
/// Call early in main() before any logging occurs.
/// Set `verbose` to true for debug-level output.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose { "debug" } else { "warn" };

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_file(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(tracing_subscriber::EnvFilter::new(level))
        .try_init();
}
