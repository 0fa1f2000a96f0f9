//! Background writer
//!
//! Producers only enqueue; a single dedicated thread owns every file handle:
//! - one file per module (`<dir>/<module>.log`)
//! - `warnings.log` and `errors.log` aggregates shared by all modules
//!
//! Each line is written with one `write_all` and flushed before the next
//! message is taken, so a processed message is on disk.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::queue::{LogQueue, Sequence};
use super::registry::{module_path, open_append, open_module_file, ModuleFileRegistry};
use super::timestamp::TimestampFormat;
use super::{LogLevel, Message};
use crate::constants::{ERRORS_FILE_NAME, WARNINGS_FILE_NAME, WRITER_THREAD_NAME};
use crate::crash;
use crate::error::{LogError, Result};

// =============================================================================
// Stats
// =============================================================================

/// Writer counters (lock-free, readable from any thread)
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Lines appended to module files
    written: AtomicU64,
    /// Lines appended to warnings.log / errors.log
    aggregated: AtomicU64,
    /// Messages (or aggregate copies) that could not be written
    write_failures: AtomicU64,
}

impl PipelineStats {
    #[inline]
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn aggregated(&self) -> u64 {
        self.aggregated.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Line format
// =============================================================================

/// `[<timestamp>] [<tag>] <body>` where tag is the level (module files) or
/// the module name (aggregate files)
pub fn format_line(timestamp: &str, tag: &str, body: &str) -> String {
    format!("[{}] [{}] {}\n", timestamp, tag, body)
}

// =============================================================================
// Pipeline
// =============================================================================

pub struct LogPipeline {
    queue: Arc<LogQueue>,
    stats: Arc<PipelineStats>,
    dir: PathBuf,
    direct: DirectWriter,
    worker: Option<JoinHandle<()>>,
}

impl LogPipeline {
    /// Create the log directory, open the aggregate files and start the
    /// writer thread.
    pub fn start(dir: impl Into<PathBuf>, time_format: TimestampFormat) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| LogError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let warnings = open_append(&dir.join(WARNINGS_FILE_NAME))?;
        let errors = open_append(&dir.join(ERRORS_FILE_NAME))?;

        let queue = Arc::new(LogQueue::new());
        let stats = Arc::new(PipelineStats::default());
        let direct = DirectWriter::new(dir.clone(), time_format.clone());

        let mut writer = Writer {
            registry: ModuleFileRegistry::new(&dir),
            warnings,
            errors,
            time_format,
            stats: stats.clone(),
        };

        let worker = {
            let queue = queue.clone();
            thread::Builder::new()
                .name(WRITER_THREAD_NAME.to_string())
                .spawn(move || {
                    crash::mark_consumer_thread();
                    queue.consume(|message| writer.write(&message));
                    debug!("log writer drained, exiting");
                })
                .map_err(|e| LogError::Io {
                    path: dir.clone(),
                    source: e,
                })?
        };

        debug!("log writer started in {}", dir.display());

        Ok(Self {
            queue,
            stats,
            dir,
            direct,
            worker: Some(worker),
        })
    }

    pub fn enqueue(&self, message: Message) -> Result<Sequence> {
        self.queue.push(message)
    }

    /// Shared handle for producers that outlive a borrow of the pipeline
    pub fn queue(&self) -> &Arc<LogQueue> {
        &self.queue
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Queue-free writer for the same directory and timestamp template
    pub fn direct_writer(&self) -> &DirectWriter {
        &self.direct
    }

    /// Block until the message with `seq` is on disk (bounded by `timeout`)
    pub fn flush_until(&self, seq: Sequence, timeout: Duration) -> bool {
        self.queue.wait_processed(seq, timeout)
    }

    /// Stop accepting messages, drain the queue and join the writer
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.queue.close();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("log writer thread panicked");
            }
        }
    }
}

impl Drop for LogPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Writer (lives on the writer thread)
// =============================================================================

struct Writer {
    registry: ModuleFileRegistry,
    warnings: File,
    errors: File,
    time_format: TimestampFormat,
    stats: Arc<PipelineStats>,
}

impl Writer {
    fn write(&mut self, message: &Message) {
        let timestamp = self.time_format.render(message.timestamp());
        let body = message.body();
        let module = message.module();

        let line = format_line(&timestamp, message.level().name(), &body);
        let result = match self.registry.file_for(module) {
            Ok(file) => match append(file, &line) {
                Ok(()) => Ok(()),
                Err(source) => Err(LogError::Io {
                    path: self.registry.path_for(module),
                    source,
                }),
            },
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                self.stats.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!("dropping message for module '{}': {}", module, e);
            }
        }

        let aggregate = match message.level() {
            LogLevel::Warning => Some((&mut self.warnings, WARNINGS_FILE_NAME)),
            LogLevel::Error => Some((&mut self.errors, ERRORS_FILE_NAME)),
            _ => None,
        };
        if let Some((file, name)) = aggregate {
            let line = format_line(&timestamp, module, &body);
            match append(file, &line) {
                Ok(()) => {
                    self.stats.aggregated.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("cannot append to {}: {}", name, e);
                }
            }
        }
    }
}

// =============================================================================
// Direct writes
// =============================================================================

/// Appends a single message to its module file without going through the
/// queue or the writer thread.
///
/// Used for fault records raised on the writer thread itself.
#[derive(Debug, Clone)]
pub struct DirectWriter {
    dir: PathBuf,
    time_format: TimestampFormat,
}

impl DirectWriter {
    pub fn new(dir: impl Into<PathBuf>, time_format: TimestampFormat) -> Self {
        Self {
            dir: dir.into(),
            time_format,
        }
    }

    pub fn write(&self, message: &Message) -> Result<()> {
        let mut file = open_module_file(&self.dir, message.module())?;
        let timestamp = self.time_format.render(message.timestamp());
        let line = format_line(&timestamp, message.level().name(), &message.body());
        append(&mut file, &line).map_err(|source| LogError::Io {
            path: module_path(&self.dir, message.module()),
            source,
        })
    }
}

fn append(file: &mut File, line: &str) -> io::Result<()> {
    file.write_all(line.as_bytes())?;
    file.flush()
}
