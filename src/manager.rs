//! Producer-facing entry points
//!
//! `LogService` is the explicitly constructed context shared (via `Arc`) by
//! every producer. `init`/`exit` are reference counted: the first `init`
//! starts the writer and installs the crash handler, the last `exit` drains
//! and joins the writer.
//!
//! Registered modules carry a level mask. `Logger` applies the mask before
//! anything is queued; the pipeline itself never filters.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::Config;
use crate::constants::PLUGIN_MODULE_PREFIX;
use crate::crash::{self, FaultTarget};
use crate::error::{LogError, Result};
use crate::logging::{
    validate_module_name, CallFrame, LevelMask, LogLevel, LogPipeline, LogQueue, Message,
    PipelineStats,
};
use crate::trace::{format_native_call, CellMemory, ParamCell};

// =============================================================================
// Service
// =============================================================================

#[derive(Default)]
struct ServiceState {
    refs: usize,
    pipeline: Option<LogPipeline>,
    /// Queue registered as the crash handler's fault target
    fault_queue: Option<Arc<LogQueue>>,
}

pub struct LogService {
    config: Config,
    /// Serializes init/exit, held across the writer join
    lifecycle: Mutex<()>,
    state: Mutex<ServiceState>,
    modules: RwLock<HashMap<String, LevelMask>>,
}

impl LogService {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            lifecycle: Mutex::new(()),
            state: Mutex::new(ServiceState::default()),
            modules: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // === Lifecycle ===

    /// Take a reference; the first one starts the pipeline.
    ///
    /// Fails (without taking a reference) if the timestamp template is
    /// invalid or the log directory cannot be prepared.
    pub fn init(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        let mut state = self.state.lock();
        if state.refs > 0 {
            state.refs += 1;
            return Ok(());
        }

        let time_format = self.config.validate()?;
        let pipeline = LogPipeline::start(&self.config.logs.dir, time_format)?;

        if self.config.crash.enabled {
            match crash::install_crash_handler() {
                Ok(()) => {
                    crash::set_fault_target(FaultTarget {
                        queue: pipeline.queue().clone(),
                        module: self.config.crash.module.clone(),
                        block_on_fatal: self.config.crash.block_on_fatal,
                        flush_timeout: self.config.crash.flush_timeout(),
                        direct: Some(pipeline.direct_writer().clone()),
                    });
                    state.fault_queue = Some(pipeline.queue().clone());
                }
                // Logging still works without fault capture
                Err(e) => warn!("crash handler not installed: {}", e),
            }
        }

        state.pipeline = Some(pipeline);
        state.refs = 1;
        debug!("log service started");
        Ok(())
    }

    /// Drop a reference; the last one drains and stops the pipeline.
    ///
    /// Calls without a matching `init` are ignored. A concurrent `init`
    /// waits until the old writer has been joined.
    pub fn exit(&self) {
        let _lifecycle = self.lifecycle.lock();
        let pipeline = {
            let mut state = self.state.lock();
            if state.refs == 0 {
                return;
            }
            state.refs -= 1;
            if state.refs > 0 {
                return;
            }
            if let Some(queue) = state.fault_queue.take() {
                crash::detach_fault_target(&queue);
            }
            state.pipeline.take()
        };

        // Joined outside the state lock so producers fail fast with NotRunning
        if let Some(pipeline) = pipeline {
            pipeline.shutdown();
            debug!("log service stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().pipeline.is_some()
    }

    pub fn ref_count(&self) -> usize {
        self.state.lock().refs
    }

    pub fn stats(&self) -> Option<Arc<PipelineStats>> {
        self.state
            .lock()
            .pipeline
            .as_ref()
            .map(|p| p.stats().clone())
    }

    /// Wait until everything queued so far is on disk
    pub fn flush(&self, timeout: Duration) -> bool {
        match self.queue() {
            Ok(queue) => queue.wait_processed(queue.last_sequence(), timeout),
            Err(_) => true,
        }
    }

    // === Modules ===

    /// Register a module; a second registration of the same name fails
    pub fn register(self: &Arc<Self>, module: &str) -> Result<Logger> {
        validate_module_name(module)?;
        let mut modules = self.modules.write();
        if modules.contains_key(module) {
            return Err(LogError::ModuleExists {
                module: module.to_string(),
            });
        }
        modules.insert(module.to_string(), self.config.logs.level_for(module));
        Ok(Logger {
            module: module.to_string(),
            service: self.clone(),
        })
    }

    /// Register `plugins/<name>`
    pub fn register_plugin(self: &Arc<Self>, name: &str) -> Result<Logger> {
        if name.is_empty() {
            return Err(LogError::EmptyModule);
        }
        self.register(&format!("{}{}", PLUGIN_MODULE_PREFIX, name))
    }

    /// Returns false if the module was not registered
    pub fn unregister(&self, module: &str) -> bool {
        self.modules.write().remove(module).is_some()
    }

    pub fn is_registered(&self, module: &str) -> bool {
        self.modules.read().contains_key(module)
    }

    pub fn log_level(&self, module: &str) -> Option<LevelMask> {
        self.modules.read().get(module).copied()
    }

    pub fn set_log_level(&self, module: &str, mask: LevelMask) -> Result<()> {
        match self.modules.write().get_mut(module) {
            Some(current) => {
                *current = mask;
                Ok(())
            }
            None => Err(Self::unknown_module(module)),
        }
    }

    // === Submission ===

    /// Queue a free-text message. No level filtering happens here.
    pub fn log_message(
        &self,
        module: &str,
        level: LogLevel,
        text: &str,
        frames: Vec<CallFrame>,
    ) -> Result<()> {
        self.check_module(module)?;
        self.enqueue(Message::new(module, level, text, frames))
    }

    /// Format and queue a native-call trace at DEBUG level.
    ///
    /// Nothing is queued if any argument or type tag is rejected.
    pub fn log_native_call(
        &self,
        module: &str,
        name: &str,
        tags: &str,
        params: &[ParamCell],
        memory: &dyn CellMemory,
        frames: Vec<CallFrame>,
    ) -> Result<()> {
        self.check_module(module)?;
        let text = format_native_call(name, tags, params, memory)?;
        self.enqueue(Message::new(module, LogLevel::Debug, text, frames))
    }

    fn check_module(&self, module: &str) -> Result<()> {
        if module.is_empty() {
            return Err(LogError::EmptyModule);
        }
        if !self.is_registered(module) {
            return Err(Self::unknown_module(module));
        }
        Ok(())
    }

    fn unknown_module(module: &str) -> LogError {
        LogError::UnknownModule {
            module: module.to_string(),
        }
    }

    fn queue(&self) -> Result<Arc<LogQueue>> {
        self.state
            .lock()
            .pipeline
            .as_ref()
            .map(|p| p.queue().clone())
            .ok_or(LogError::NotRunning)
    }

    fn enqueue(&self, message: Message) -> Result<()> {
        if crash::is_installed() {
            if let Err(e) = crash::install_signal_handler_for_thread() {
                warn!("signal handlers not installed for this thread: {}", e);
            }
        }
        self.queue()?.push(message).map(|_| ())
    }
}

impl Drop for LogService {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(queue) = state.fault_queue.take() {
            crash::detach_fault_target(&queue);
        }
    }
}

// =============================================================================
// Logger handle
// =============================================================================

/// Handle for one registered module
pub struct Logger {
    module: String,
    service: Arc<LogService>,
}

impl Logger {
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn service(&self) -> &Arc<LogService> {
        &self.service
    }

    pub fn log_level(&self) -> LevelMask {
        self.service
            .log_level(&self.module)
            .unwrap_or(LevelMask::NONE)
    }

    pub fn set_log_level(&self, mask: LevelMask) -> Result<()> {
        self.service.set_log_level(&self.module, mask)
    }

    #[inline]
    pub fn is_log_level(&self, level: LogLevel) -> bool {
        self.log_level().contains(level)
    }

    /// Queue `text` if `level` passes the module mask.
    ///
    /// Returns `Ok(false)` when filtered out.
    pub fn log(&self, level: LogLevel, text: &str) -> Result<bool> {
        self.log_with_frames(level, text, Vec::new())
    }

    pub fn log_with_frames(
        &self,
        level: LogLevel,
        text: &str,
        frames: Vec<CallFrame>,
    ) -> Result<bool> {
        if !self.is_log_level(level) {
            return Ok(false);
        }
        self.service
            .log_message(&self.module, level, text, frames)
            .map(|()| true)
    }

    /// `format_args!` entry point; formats only if the level passes
    pub fn log_args(&self, level: LogLevel, args: fmt::Arguments<'_>) -> Result<bool> {
        if !self.is_log_level(level) {
            return Ok(false);
        }
        self.log(level, &args.to_string())
    }

    /// Format and queue a native-call trace (DEBUG).
    ///
    /// Malformed calls fail even when DEBUG is masked out.
    pub fn log_native_call(
        &self,
        name: &str,
        tags: &str,
        params: &[ParamCell],
        memory: &dyn CellMemory,
        frames: Vec<CallFrame>,
    ) -> Result<bool> {
        let text = format_native_call(name, tags, params, memory)?;
        self.log_with_frames(LogLevel::Debug, &text, frames)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("module", &self.module)
            .field("level", &self.log_level())
            .finish()
    }
}
