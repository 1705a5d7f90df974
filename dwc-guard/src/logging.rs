//! Logging for dwc-guard.
//!
//! The library only emits `tracing` events and spans. Deployments install a
//! subscriber through [`ValidatorConfig::init_logging`](crate::config::ValidatorConfig::init_logging)
//! or bring their own.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::error::{Result, ValidatorError};

/// Maximum length of free-text values, such as failure messages, written to
/// logs.
pub const DEFAULT_MAX_FIELD_LENGTH: usize = 256;

/// Job lifecycle and validation summaries from this crate, warnings from
/// everything else.
pub const DEFAULT_LOG_FILTER: &str = "warn,dwc_guard=info";

/// Truncates a string to `max_length` bytes, on a character boundary.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let end = value
        .char_indices()
        .map(|(index, _)| index)
        .take_while(|index| *index <= max_length)
        .last()
        .unwrap_or(0);
    format!("{}...(truncated)", &value[..end])
}

/// Line format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = ValidatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            other => Err(ValidatorError::Configuration(format!(
                "unknown log format '{other}'"
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Json => "json",
        })
    }
}

/// Parses `filter` with the `RUST_LOG` directive syntax.
pub fn parse_filter(filter: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| ValidatorError::Configuration(format!("invalid log filter '{filter}': {e}")))
}

/// Installs the global subscriber. A `RUST_LOG` variable replaces `filter`.
///
/// Fails if `filter` does not parse or a global subscriber is already set.
pub fn init_logging(filter: &str, format: LogFormat) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => parse_filter(filter)?,
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match format {
        LogFormat::Plain => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| ValidatorError::Configuration(format!("cannot install logging: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Plain);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(ValidatorError::Configuration(_))
        ));
    }

    #[test]
    fn test_parse_filter() {
        assert!(parse_filter(DEFAULT_LOG_FILTER).is_ok());
        assert!(parse_filter("dwc_guard::jobserver=trace").is_ok());
        let err = parse_filter("dwc_guard=loudest").unwrap_err();
        assert!(err.to_string().contains("dwc_guard=loudest"));
    }

    #[test]
    fn test_truncate_field() {
        assert_eq!(truncate_field("hello", 10), "hello");
        assert_eq!(
            truncate_field("this is a very long text that should be truncated", 10),
            "this is a ...(truncated)"
        );
        // never splits a multi-byte character
        assert_eq!(truncate_field("ééééé", 3), "é...(truncated)");
    }
}
