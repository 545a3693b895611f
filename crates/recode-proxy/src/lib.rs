//! Stdio proxy that runs a language server and re-encodes its output.
//!
//! [`spawn`] starts the server with its three standard streams piped and a
//! [`Multiplexer`] relays bytes in a single cooperative loop:
//!
//! - client stdin to server stdin, unchanged;
//! - server stderr to client stderr, unchanged;
//! - server stdout through a [`recode_frame::FrameAdapter`] to client stdout.
//!
//! The loop suspends only in the readiness wait. Every read is preceded by a
//! zero-timeout readiness check. The server's stdin is non-blocking and input
//! it cannot take yet is queued, so a server busy writing its own output
//! never stalls the relay. The session ends when the server exits, when a [`StopSignal`] fires, or when
//! the client's stdout stops accepting writes. Unix only.

mod error;
mod multiplexer;
mod process;
mod shutdown;
mod stream;

#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::AsFd;

pub use error::ProxyError;
pub use multiplexer::{
    ClientStreams, DEFAULT_TERMINATION_GRACE, EndReason, Multiplexer, SessionOptions,
    SessionOutcome,
};
pub use process::{ServerCommand, ServerPipes, ServerProcess, spawn};
pub use shutdown::{STOP_SIGNALS, SignalStop, StopSignal};

/// Log target for session-level events.
pub(crate) const PROXY_TARGET: &str = "recode_proxy::multiplexer";

/// Spawns the server and relays until the session ends.
///
/// # Errors
///
/// Returns a spawn error before any byte is relayed, or
/// [`ProxyError::Frame`] when the server's output cannot be framed.
pub fn run_session<R, O, E, S>(
    command: &ServerCommand,
    client: ClientStreams<R, O, E>,
    options: SessionOptions,
    stop: S,
) -> Result<SessionOutcome, ProxyError>
where
    R: Read + AsFd,
    O: Write,
    E: Write,
    S: StopSignal,
{
    let (server, pipes) = spawn(command)?;
    Multiplexer::new(server, pipes, client, options, stop).run()
}

/// Duplicates the process's stdin into an owned, unbuffered file.
///
/// Reading through [`std::io::Stdin`] would buffer bytes where the readiness
/// wait cannot see them.
///
/// # Errors
///
/// Returns [`ProxyError::ClientStdin`] when the descriptor cannot be
/// duplicated.
pub fn client_stdin() -> Result<File, ProxyError> {
    io::stdin()
        .as_fd()
        .try_clone_to_owned()
        .map(File::from)
        .map_err(|source| ProxyError::ClientStdin { source })
}
