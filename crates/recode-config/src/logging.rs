use strum::{Display, EnumString};

/// Verbosity threshold for the proxy's own diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogLevel {
    /// Per-chunk and payload tracing.
    Trace,
    /// Per-frame decisions.
    Debug,
    /// Session lifecycle events.
    #[default]
    Info,
    /// Recoverable anomalies such as discarded partial frames.
    Warn,
    /// Fatal session errors only.
    Error,
}

impl LogLevel {
    /// Returns the filter directive understood by `tracing-subscriber`.
    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Supported logging output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Human-readable single line output.
    #[default]
    Compact,
    /// Structured JSON suitable for ingestion by logging stacks.
    Json,
}

/// Errors encountered while parsing a [`LogLevel`] or [`LogFormat`] from text.
pub type LogParseError = strum::ParseError;
