//! Runtime for the `lsp-recode` binary.
//!
//! [`run`] resolves the configuration, installs telemetry and the stop
//! signal handlers, then hands the process's standard streams to a
//! [`recode_proxy`] session. The process exits with the server's exit code.

mod errors;
mod telemetry;

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::process::ExitCode;

use recode_config::{Config, ConfigError};
use recode_proxy::{ClientStreams, ServerCommand, SessionOptions, SignalStop};
use tracing::{debug, error, info};

use crate::errors::AppError;

/// Log target for binary lifecycle events.
const CLI_TARGET: &str = "recode_cli";

/// Prefix for diagnostics written to stderr.
const DIAGNOSTIC_PREFIX: &str = "lsp-recode";

/// Runs the proxy with the given arguments and client output streams.
///
/// Help and version output go to `stdout` with a successful exit status.
/// Configuration, spawn, telemetry and framing errors are written to `stderr`
/// and exit with status 1.
#[must_use]
pub fn run<I, W, E>(args: I, mut stdout: W, mut stderr: E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let config = match Config::load_from_iter(args) {
        Ok(config) => config,
        Err(error) => return report_config_error(&error, &mut stdout, &mut stderr),
    };

    match execute(&config, &mut stdout, &mut stderr) {
        Ok(exit_code) => exit_code,
        Err(app_error) => {
            error!(target: CLI_TARGET, error = %app_error, "lsp-recode failed");
            emit(&mut stderr, format_args!("{DIAGNOSTIC_PREFIX}: {app_error}\n"));
            ExitCode::FAILURE
        }
    }
}

fn execute<W, E>(config: &Config, stdout: &mut W, stderr: &mut E) -> Result<ExitCode, AppError>
where
    W: Write,
    E: Write,
{
    telemetry::initialise(config)?;
    info!(
        target: CLI_TARGET,
        version = env!("CARGO_PKG_VERSION"),
        cwd = ?env::current_dir().ok(),
        server = config.server(),
        args = ?config.server_args(),
        encoding = %config.source_encoding(),
        "lsp-recode starting"
    );

    let stop = SignalStop::install()?;
    let command = ServerCommand::new(config.server(), config.server_args().iter().cloned());
    let client = ClientStreams {
        stdin: recode_proxy::client_stdin()?,
        stdout,
        stderr,
    };
    let options = SessionOptions::new(config.source_encoding(), config.poll_interval());

    let outcome = recode_proxy::run_session(&command, client, options, stop)?;
    info!(
        target: CLI_TARGET,
        reason = ?outcome.reason,
        exit_code = outcome.exit_code,
        "session ended"
    );
    Ok(exit_code_from_status(outcome.exit_code))
}

fn report_config_error<W, E>(error: &ConfigError, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    W: Write,
    E: Write,
{
    if error.is_informational() {
        emit(stdout, format_args!("{error}"));
        return ExitCode::SUCCESS;
    }
    match error {
        ConfigError::Usage(_) => {
            emit(stderr, format_args!("{error}"));
        }
        ConfigError::EmptyServer => {
            emit(stderr, format_args!("{DIAGNOSTIC_PREFIX}: {error}\n"));
        }
    }
    ExitCode::FAILURE
}

/// Writes a diagnostic; a closed stream leaves nowhere else to report to.
fn emit<W: Write>(stream: &mut W, message: fmt::Arguments<'_>) {
    if let Err(error) = stream.write_fmt(message).and_then(|()| stream.flush()) {
        debug!(target: CLI_TARGET, %error, "diagnostic could not be written");
    }
}

fn exit_code_from_status(status: Option<i32>) -> ExitCode {
    status
        .and_then(|code| u8::try_from(code).ok())
        .map_or(ExitCode::FAILURE, ExitCode::from)
}
