//! Language server subprocess lifecycle.

use std::io;
use std::os::fd::AsFd;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::error::ProxyError;
use crate::stream::set_nonblocking;

/// Log target for process operations.
pub(crate) const PROCESS_TARGET: &str = "recode_proxy::process";

/// Interval between exit checks while waiting out a termination grace period.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Program and arguments of the language server.
///
/// The argument vector is passed to the operating system as is; it is never
/// run through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    program: String,
    args: Vec<String>,
}

impl ServerCommand {
    /// Creates a command from the program and its arguments.
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The executable to run.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the executable.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// The three pipe ends connected to the server's standard streams.
///
/// Each end is owned independently so the proxy can close the server's stdin
/// while still reading its output.
#[derive(Debug)]
pub struct ServerPipes {
    /// Write end of the server's stdin.
    pub stdin: ChildStdin,
    /// Read end of the server's stdout.
    pub stdout: ChildStdout,
    /// Read end of the server's stderr.
    pub stderr: ChildStderr,
}

/// Handle to a running language server.
///
/// Dropping the handle kills and reaps a server that is still running.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    command: String,
    status: Option<ExitStatus>,
    reaped: bool,
}

/// Spawns the language server with all three standard streams piped.
///
/// The write end of the server's stdin is non-blocking, so a server that
/// stops reading cannot stall the relay.
///
/// # Errors
///
/// Returns [`ProxyError::BinaryNotFound`] when the executable does not exist
/// and [`ProxyError::SpawnFailed`] for any other spawn failure, including a
/// missing pipe handle.
pub fn spawn(command: &ServerCommand) -> Result<(ServerProcess, ServerPipes), ProxyError> {
    debug!(
        target: PROCESS_TARGET,
        program = command.program(),
        args = ?command.args(),
        "spawning language server"
    );

    let mut child = Command::new(command.program())
        .args(command.args())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ProxyError::BinaryNotFound {
                    command: command.program().to_owned(),
                    source,
                }
            } else {
                ProxyError::SpawnFailed {
                    command: command.program().to_owned(),
                    source,
                }
            }
        })?;

    let missing_pipe = |stream: &str| ProxyError::SpawnFailed {
        command: command.program().to_owned(),
        source: io::Error::other(format!("failed to capture {stream}")),
    };
    let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
    set_nonblocking(stdin.as_fd()).map_err(|errno| ProxyError::SpawnFailed {
        command: command.program().to_owned(),
        source: io::Error::from(errno),
    })?;
    let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;
    let pipes = ServerPipes {
        stdin,
        stdout,
        stderr,
    };

    info!(
        target: PROCESS_TARGET,
        program = command.program(),
        pid = child.id(),
        "language server started"
    );

    Ok((
        ServerProcess {
            child,
            command: command.program().to_owned(),
            status: None,
            reaped: false,
        },
        pipes,
    ))
}

impl ServerProcess {
    /// Operating system process identifier.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Returns true while the server has not been observed to exit.
    ///
    /// Never blocks. The exit status is cached once observed.
    pub fn is_alive(&mut self) -> bool {
        if self.reaped {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.record_exit(status);
                false
            }
            Ok(None) => true,
            Err(error) => {
                warn!(
                    target: PROCESS_TARGET,
                    pid = self.child.id(),
                    error = %error,
                    "failed to query language server status"
                );
                self.reaped = true;
                false
            }
        }
    }

    /// Exit status once collected.
    #[must_use]
    pub const fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Exit code once collected; a death by signal maps to `128 + signal`.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(exit_code_of)
    }

    /// Stops the server: `SIGTERM`, up to `grace` for it to exit, then
    /// `SIGKILL`. Always reaps the process.
    pub fn terminate(&mut self, grace: Duration) {
        if !self.is_alive() {
            return;
        }

        debug!(
            target: PROCESS_TARGET,
            pid = self.child.id(),
            grace_ms = grace.as_millis(),
            "terminating language server"
        );
        if let Err(error) = self.signal(Signal::SIGTERM) {
            warn!(
                target: PROCESS_TARGET,
                pid = self.child.id(),
                error = %error,
                "failed to send SIGTERM"
            );
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !self.is_alive() {
                return;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
        if !self.is_alive() {
            return;
        }

        warn!(
            target: PROCESS_TARGET,
            pid = self.child.id(),
            "language server ignored SIGTERM, killing"
        );
        self.kill_and_reap();
    }

    fn signal(&self, signal: Signal) -> nix::Result<()> {
        let pid = i32::try_from(self.child.id()).map_err(|_| nix::errno::Errno::ESRCH)?;
        kill(Pid::from_raw(pid), signal)
    }

    fn kill_and_reap(&mut self) {
        if let Err(error) = self.child.kill() {
            debug!(
                target: PROCESS_TARGET,
                pid = self.child.id(),
                error = %error,
                "kill failed"
            );
        }
        match self.child.wait() {
            Ok(status) => self.record_exit(status),
            Err(error) => {
                warn!(
                    target: PROCESS_TARGET,
                    pid = self.child.id(),
                    error = %error,
                    "failed to reap language server"
                );
                self.reaped = true;
            }
        }
    }

    fn record_exit(&mut self, status: ExitStatus) {
        self.status = Some(status);
        self.reaped = true;
        info!(
            target: PROCESS_TARGET,
            program = %self.command,
            pid = self.child.id(),
            code = status.code(),
            signal = status.signal(),
            "language server exited"
        );
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if !self.reaped {
            self.kill_and_reap();
        }
    }
}

fn exit_code_of(status: ExitStatus) -> Option<i32> {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
}
