use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing::Span;

use crate::error::{MonitorError, Result};

/// Parse a log level name. Unset means warnings and above.
pub fn parse_level(name: Option<&str>) -> Result<LevelFilter> {
    let Some(name) = name else {
        return Ok(LevelFilter::WARN);
    };
    match name.to_ascii_lowercase().as_str() {
        "error" | "fatal" | "panic" => Ok(LevelFilter::ERROR),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        _ => Err(MonitorError::Configuration(format!("No such log level {}", name))),
    }
}

/// Identifier prefixed to every record: the container id, plus the tag.
pub fn log_id(cid: &str, tag: Option<&str>) -> String {
    match tag {
        Some(tag) => format!("{}: {}", cid, tag),
        None => cid.to_string(),
    }
}

/// Install the global subscriber, writing to stderr or appending to `file`.
pub fn init(level: LevelFilter, file: Option<&Path>) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_max_level(level).with_target(false);
    let installed = match file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| MonitorError::Configuration(format!("Failed to set up logging: {}", e)))
}

/// Span every record of the session is emitted in. Error level so it stays
/// enabled whatever the configured level is.
pub fn session_span(cid: &str, tag: Option<&str>) -> Span {
    tracing::error_span!("ctrmon", id = %log_id(cid, tag))
}
