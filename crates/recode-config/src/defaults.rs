//! Built-in defaults applied when neither a flag nor the environment sets a
//! value.

use recode_frame::SourceEncoding;

use crate::logging::{LogFormat, LogLevel};

/// Default readiness wait bound, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u16 = 1000;

/// Default encoding assumed for server bodies.
#[must_use]
pub fn default_source_encoding() -> SourceEncoding {
    SourceEncoding::canonical()
}

/// Default verbosity for the binaries.
#[must_use]
pub fn default_log_level() -> LogLevel {
    LogLevel::Info
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Compact
}
