//! modlog - write module logs from the command line
//!
//! Usage:
//!   modlog log plugins/foo warning "disk almost full" --frame gm.pwn:12
//!   modlog native core SetHealth df 3 87.5
//!   modlog crash segv

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::time::Duration;

use modlog::cli::{Cli, Command};
use modlog::{config, logging, CallFrame, LevelMask, LogService, NoMemory, ParamCell};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let mut config = config::load_or_default(&cli.config);
    if matches!(cli.command, Command::Crash { .. }) {
        config.crash.enabled = true;
    }

    let service = LogService::new(config);
    service.init().context("Cannot start log service")?;
    let result = run(&service, cli.command);
    service.exit();
    result
}

fn run(service: &std::sync::Arc<LogService>, command: Command) -> Result<()> {
    match command {
        Command::Log {
            module,
            level,
            text,
            frames,
        } => {
            let frames = frames
                .iter()
                .map(|f| parse_frame(f))
                .collect::<Result<Vec<_>>>()?;
            service.register(&module)?;
            service.log_message(&module, level.into(), &text, frames)?;
        }
        Command::Native {
            module,
            name,
            tags,
            values,
        } => {
            let params = tags
                .chars()
                .zip(&values)
                .map(|(tag, value)| parse_param(tag, value))
                .collect::<Result<Vec<_>>>()?;
            let logger = service.register(&module)?;
            logger.set_log_level(LevelMask::ALL)?;
            logger.log_native_call(&name, &tags, &params, &NoMemory, Vec::new())?;
        }
        Command::Crash { signal } => {
            if !modlog::crash::is_installed() {
                bail!("crash handler is not installed");
            }
            // Give the writer a moment so the startup order is visible in the logs
            service.flush(Duration::from_millis(100));
            raise(signal.number());
        }
    }
    Ok(())
}

fn parse_frame(raw: &str) -> Result<CallFrame> {
    let (file, line) = raw
        .rsplit_once(':')
        .with_context(|| format!("Frame '{}' is not FILE:LINE", raw))?;
    let line = line
        .parse()
        .with_context(|| format!("Invalid line number in '{}'", raw))?;
    Ok(CallFrame::new(file, line))
}

fn parse_param(tag: char, raw: &str) -> Result<ParamCell> {
    if tag == 'f' {
        let value: f32 = raw
            .parse()
            .with_context(|| format!("'{}' is not a float", raw))?;
        return Ok(ParamCell::from_float(value));
    }
    let value: i32 = raw
        .parse()
        .with_context(|| format!("'{}' is not an integer", raw))?;
    Ok(ParamCell::from_int(value))
}

fn raise(signal: i32) {
    // SAFETY: raise has no memory preconditions.
    unsafe {
        libc::raise(signal);
    }
}
