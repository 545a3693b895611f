//! Command-line and environment configuration for `lsp-recode`.
//!
//! Every option is a `clap` flag with an `LSP_RECODE_*` environment fallback.
//! Values resolve with the precedence CLI flag, then environment, then the
//! built-in default from [`defaults`]. Everything after the server program
//! belongs to the server and is never interpreted here.

pub mod defaults;
mod logging;

use std::ffi::OsString;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use clap::error::ErrorKind;
use recode_frame::SourceEncoding;
use thiserror::Error;

pub use defaults::{
    DEFAULT_POLL_INTERVAL_MS, default_log_format, default_log_level, default_source_encoding,
};
pub use logging::{LogFormat, LogLevel, LogParseError};

/// Environment variable overriding `--source-encoding`.
pub const SOURCE_ENCODING_ENV: &str = "LSP_RECODE_SOURCE_ENCODING";
/// Environment variable overriding `--log-level`.
pub const LOG_LEVEL_ENV: &str = "LSP_RECODE_LOG_LEVEL";
/// Environment variable overriding `--log-format`.
pub const LOG_FORMAT_ENV: &str = "LSP_RECODE_LOG_FORMAT";
/// Environment variable overriding `--log-file`.
pub const LOG_FILE_ENV: &str = "LSP_RECODE_LOG_FILE";
/// Environment variable overriding `--poll-interval-ms`.
pub const POLL_INTERVAL_ENV: &str = "LSP_RECODE_POLL_INTERVAL_MS";

/// Errors raised while resolving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Argument parsing failed, or help or version output was requested.
    #[error("{0}")]
    Usage(#[from] clap::Error),

    /// The server program was given as an empty string.
    #[error("the server command must not be empty")]
    EmptyServer,
}

impl ConfigError {
    /// Returns true when the error carries help or version text rather than
    /// a failure.
    #[must_use]
    pub fn is_informational(&self) -> bool {
        match self {
            Self::Usage(error) => matches!(
                error.kind(),
                ErrorKind::DisplayHelp
                    | ErrorKind::DisplayVersion
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ),
            Self::EmptyServer => false,
        }
    }
}

/// Runs a language server and re-encodes its output to UTF-8.
///
/// Frame bodies the server writes in a legacy encoding are converted to
/// UTF-8 and their `Content-Length` recomputed. Client input and server
/// stderr are relayed unchanged.
#[derive(Parser, Debug, Clone)]
#[command(name = "lsp-recode", version, long_about = None)]
pub struct Config {
    /// Encoding the server writes its message bodies in.
    #[arg(
        long,
        visible_alias = "original-output-encoding",
        value_name = "LABEL",
        env = SOURCE_ENCODING_ENV,
        default_value_t = default_source_encoding()
    )]
    source_encoding: SourceEncoding,

    /// Minimum level of the proxy's own log output.
    #[arg(
        long,
        value_name = "LEVEL",
        env = LOG_LEVEL_ENV,
        default_value_t = default_log_level()
    )]
    log_level: LogLevel,

    /// Log output format (`compact` or `json`).
    #[arg(
        long,
        value_name = "FORMAT",
        env = LOG_FORMAT_ENV,
        default_value_t = default_log_format()
    )]
    log_format: LogFormat,

    /// Write logs to this file instead of stderr.
    #[arg(long, value_name = "PATH", env = LOG_FILE_ENV)]
    log_file: Option<Utf8PathBuf>,

    /// Upper bound on each readiness wait, in milliseconds.
    #[arg(
        long,
        value_name = "MS",
        env = POLL_INTERVAL_ENV,
        default_value_t = DEFAULT_POLL_INTERVAL_MS,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    poll_interval_ms: u16,

    /// Language server executable to run.
    #[arg(value_name = "SERVER")]
    server: String,

    /// Arguments passed to the server verbatim.
    #[arg(
        value_name = "SERVER_ARGS",
        num_args = 0..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    server_args: Vec<String>,
}

impl Config {
    /// Parses the configuration from an argument list whose first element
    /// is the binary name, consulting the environment for omitted options.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Usage`] for malformed or missing arguments and
    /// for help or version requests, and [`ConfigError::EmptyServer`] when
    /// the server program is blank.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::try_parse_from(args)?;
        if config.server.trim().is_empty() {
            return Err(ConfigError::EmptyServer);
        }
        Ok(config)
    }

    /// Encoding assumed for server frame bodies.
    #[must_use]
    pub const fn source_encoding(&self) -> SourceEncoding {
        self.source_encoding
    }

    /// Configured log level.
    #[must_use]
    pub const fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// Configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Log file path, when logs should not go to stderr.
    #[must_use]
    pub fn log_file(&self) -> Option<&Utf8Path> {
        self.log_file.as_deref()
    }

    /// Readiness wait bound.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_interval_ms))
    }

    /// Server executable.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Arguments passed to the server.
    #[must_use]
    pub fn server_args(&self) -> &[String] {
        &self.server_args
    }
}
