//! Log message types
//!
//! Core types for representing messages queued to the pipeline.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

use crate::constants::{FRAME_SEPARATOR, UNKNOWN_LEVEL_NAME};

/// Severity of a message (bit values match the module level mask)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    Debug = 1,
    Info = 2,
    #[serde(alias = "warn")]
    Warning = 4,
    Error = 8,
    Fatal = 16,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    /// Upper-case name written into log lines
    pub fn name(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.bits() == bits)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Level name for a raw level value coming from a foreign caller.
///
/// Values outside the known set map to a placeholder instead of failing.
pub fn level_name(bits: u8) -> &'static str {
    LogLevel::from_bits(bits)
        .map(LogLevel::name)
        .unwrap_or(UNKNOWN_LEVEL_NAME)
}

/// Set of levels a module accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<LogLevel>", into = "Vec<LogLevel>")]
pub struct LevelMask(u8);

impl LevelMask {
    pub const NONE: LevelMask = LevelMask(0);
    pub const ALL: LevelMask = LevelMask(0b1_1111);

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn contains(self, level: LogLevel) -> bool {
        self.0 & level.bits() == level.bits()
    }

    pub fn with(self, level: LogLevel) -> Self {
        LevelMask(self.0 | level.bits())
    }

    pub fn levels(self) -> impl Iterator<Item = LogLevel> {
        LogLevel::ALL.into_iter().filter(move |l| self.contains(*l))
    }
}

impl Default for LevelMask {
    /// Everything above DEBUG
    fn default() -> Self {
        LevelMask::NONE
            .with(LogLevel::Info)
            .with(LogLevel::Warning)
            .with(LogLevel::Error)
            .with(LogLevel::Fatal)
    }
}

impl From<LogLevel> for LevelMask {
    fn from(level: LogLevel) -> Self {
        LevelMask(level.bits())
    }
}

impl BitOr<LogLevel> for LevelMask {
    type Output = LevelMask;

    fn bitor(self, rhs: LogLevel) -> LevelMask {
        self.with(rhs)
    }
}

impl BitOr for LogLevel {
    type Output = LevelMask;

    fn bitor(self, rhs: LogLevel) -> LevelMask {
        LevelMask::from(self).with(rhs)
    }
}

impl From<Vec<LogLevel>> for LevelMask {
    fn from(levels: Vec<LogLevel>) -> Self {
        levels.into_iter().fold(LevelMask::NONE, LevelMask::with)
    }
}

impl From<LevelMask> for Vec<LogLevel> {
    fn from(mask: LevelMask) -> Self {
        mask.levels().collect()
    }
}

/// One resolved location in a captured call stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub file: String,
    pub line: u32,
}

impl CallFrame {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A message waiting in the queue
///
/// Immutable once built; the queue owns it until the writer consumes it.
#[derive(Debug, Clone)]
pub struct Message {
    module: String,
    level: LogLevel,
    text: String,
    frames: Vec<CallFrame>,
    timestamp: DateTime<Local>,
}

impl Message {
    /// Create a message stamped with the current local time
    pub fn new(
        module: impl Into<String>,
        level: LogLevel,
        text: impl Into<String>,
        frames: Vec<CallFrame>,
    ) -> Self {
        Self::with_timestamp(module, level, text, frames, Local::now())
    }

    pub fn with_timestamp(
        module: impl Into<String>,
        level: LogLevel,
        text: impl Into<String>,
        frames: Vec<CallFrame>,
        timestamp: DateTime<Local>,
    ) -> Self {
        Self {
            module: module.into(),
            level,
            text: text.into(),
            frames,
            timestamp,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    pub fn timestamp(&self) -> &DateTime<Local> {
        &self.timestamp
    }

    /// Text followed by the call-trace suffix, if any
    pub fn body(&self) -> String {
        if self.frames.is_empty() {
            return self.text.clone();
        }
        let trace = self
            .frames
            .iter()
            .map(CallFrame::to_string)
            .collect::<Vec<_>>()
            .join(FRAME_SEPARATOR);
        format!("{} ({})", self.text, trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(LogLevel::Debug.name(), "DEBUG");
        assert_eq!(LogLevel::Warning.name(), "WARNING");
        assert_eq!(LogLevel::Fatal.to_string(), "FATAL");
    }

    #[test]
    fn test_unknown_raw_level_maps_to_placeholder() {
        assert_eq!(level_name(8), "ERROR");
        assert_eq!(level_name(3), "<unknown>");
        assert_eq!(level_name(0), "<unknown>");
    }

    #[test]
    fn test_mask_contains() {
        let mask = LogLevel::Warning | LogLevel::Error;
        assert!(mask.contains(LogLevel::Warning));
        assert!(mask.contains(LogLevel::Error));
        assert!(!mask.contains(LogLevel::Debug));
        assert!(!LevelMask::NONE.contains(LogLevel::Fatal));
        assert!(LevelMask::ALL.contains(LogLevel::Debug));
    }

    #[test]
    fn test_default_mask_excludes_debug() {
        let mask = LevelMask::default();
        assert!(!mask.contains(LogLevel::Debug));
        assert_eq!(mask.levels().count(), 4);
    }

    #[test]
    fn test_mask_toml_list() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            mask: LevelMask,
        }

        let w: Wrapper = toml::from_str("mask = [\"debug\", \"warn\"]").unwrap();
        assert_eq!(w.mask, LogLevel::Debug | LogLevel::Warning);

        let s = toml::to_string(&Wrapper { mask: w.mask }).unwrap();
        assert!(s.contains("\"debug\""));
        assert!(s.contains("\"warning\""));
    }

    #[test]
    fn test_body_without_frames() {
        let msg = Message::new("core", LogLevel::Info, "hello", vec![]);
        assert_eq!(msg.body(), "hello");
    }

    #[test]
    fn test_body_with_frames() {
        let frames = vec![CallFrame::new("a.pwn", 10), CallFrame::new("b.inc", 3)];
        let msg = Message::new("core", LogLevel::Info, "hello", frames);
        assert_eq!(msg.body(), "hello (a.pwn:10 -> b.inc:3)");
    }
}
