//! Support for structured logging.

use std::{io, str::FromStr};

use tracing_subscriber::EnvFilter;

use crate::common::*;

/// Log level used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "warn";

/// What log format we should use.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum LogFormat {
    /// Pretty, indented logs.
    Indented,
    /// Single-line log entries with all keys on each line.
    Flat,
    /// JSON records.
    Json,
}

impl LogFormat {
    /// Install a global `tracing` subscriber which writes this format to
    /// standard error.
    pub(crate) fn install(self) -> Result<()> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let builder = tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_env_filter(filter);
        let result = match self {
            Self::Indented => builder.compact().try_init(),
            Self::Flat => builder.with_ansi(false).try_init(),
            Self::Json => builder.json().try_init(),
        };
        result.map_err(|err| format_err!("could not install logger: {}", err))
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "indented" => Ok(LogFormat::Indented),
            "flat" => Ok(LogFormat::Flat),
            "json" => Ok(LogFormat::Json),
            _ => Err(format_err!("unknown log format: {}", s)),
        }
    }
}

#[test]
fn parses_known_log_formats() {
    assert_eq!("indented".parse::<LogFormat>().unwrap(), LogFormat::Indented);
    assert_eq!("flat".parse::<LogFormat>().unwrap(), LogFormat::Flat);
    assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
    let err = "xml".parse::<LogFormat>().unwrap_err();
    assert_eq!(err.to_string(), "unknown log format: xml");
}
