//! Error types for the proxy session.

use std::io;

use recode_frame::FrameError;
use thiserror::Error;

/// Errors that end or prevent a proxy session.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The server executable does not exist.
    #[error("language server binary not found: {command}")]
    BinaryNotFound {
        /// The command that was not found.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The server process could not be started or its pipes captured.
    #[error("failed to spawn language server '{command}': {source}")]
    SpawnFailed {
        /// The command that failed to start.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The server's output stream could not be framed.
    #[error("server output is not valid LSP framing: {0}")]
    Frame(#[from] FrameError),

    /// Installing the stop signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    SignalInstall {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The client's standard input could not be prepared for polling.
    #[error("failed to prepare client stdin: {source}")]
    ClientStdin {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}
