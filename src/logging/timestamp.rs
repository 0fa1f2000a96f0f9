//! Timestamp template
//!
//! The template is configured once and validated before the writer starts,
//! so formatting a line never has to deal with a broken template.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use std::fmt::Write;

use crate::constants::{DEFAULT_TIME_FORMAT, TIME_FORMAT_STRIPPED_CHARS};
use crate::error::{LogError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampFormat {
    template: String,
}

impl TimestampFormat {
    /// Validate a strftime template.
    ///
    /// Brackets and parentheses are removed first: every line already wraps
    /// the timestamp in `[...]`.
    pub fn parse(raw: &str) -> Result<Self> {
        let template: String = raw
            .chars()
            .filter(|c| !TIME_FORMAT_STRIPPED_CHARS.contains(c))
            .collect();

        if StrftimeItems::new(&template).any(|item| matches!(item, Item::Error)) {
            return Err(LogError::InvalidTimeFormat {
                format: raw.to_string(),
            });
        }

        Ok(Self { template })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn render(&self, timestamp: &DateTime<Local>) -> String {
        let mut out = String::new();
        if write!(out, "{}", timestamp.format(&self.template)).is_err() {
            out.clear();
            out.push_str(&timestamp.to_rfc3339());
        }
        out
    }
}

impl Default for TimestampFormat {
    fn default() -> Self {
        Self {
            template: DEFAULT_TIME_FORMAT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_strips_brackets() {
        let fmt = TimestampFormat::parse("[%H:%M:%S]").unwrap();
        assert_eq!(fmt.template(), "%H:%M:%S");
    }

    #[test]
    fn test_rejects_invalid_template() {
        let err = TimestampFormat::parse("%Q %H").unwrap_err();
        assert!(matches!(err, LogError::InvalidTimeFormat { .. }));
    }

    #[test]
    fn test_render() {
        let fmt = TimestampFormat::parse("%Y-%m-%d %H:%M:%S").unwrap();
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(fmt.render(&ts), "2024-03-09 07:05:01");
    }

    #[test]
    fn test_default_is_valid() {
        assert!(TimestampFormat::parse(DEFAULT_TIME_FORMAT).is_ok());
    }
}
