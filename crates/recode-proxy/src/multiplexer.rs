//! The single-threaded relay loop between the client and the server.

use std::io::{Read, Write};
use std::ops::ControlFlow;
use std::os::fd::AsFd;
use std::process::{ChildStderr, ChildStdin, ChildStdout};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use recode_frame::{FrameAdapter, SourceEncoding};
use tracing::{debug, info, warn};

use crate::PROXY_TARGET;
use crate::error::ProxyError;
use crate::process::{ServerPipes, ServerProcess};
use crate::shutdown::StopSignal;
use crate::stream::{Delivery, Drained, Sink, Source, readable_flags, writable_flags};

/// Default time the server gets to exit after `SIGTERM`.
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_millis(500);

/// Client input queued for the server beyond which client stdin is no longer
/// read until the server catches up.
const MAX_QUEUED_INPUT: usize = 1024 * 1024;

/// Tunables for one proxy session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Encoding the server writes its bodies in.
    pub source_encoding: SourceEncoding,
    /// Upper bound on each readiness wait.
    pub poll_interval: Duration,
    /// Time the server gets to exit after `SIGTERM` before it is killed.
    pub termination_grace: Duration,
}

impl SessionOptions {
    /// Options with the default termination grace period.
    #[must_use]
    pub const fn new(source_encoding: SourceEncoding, poll_interval: Duration) -> Self {
        Self {
            source_encoding,
            poll_interval,
            termination_grace: DEFAULT_TERMINATION_GRACE,
        }
    }
}

/// The client's side of the proxy: what the editor writes to us and where
/// we write back.
#[derive(Debug)]
pub struct ClientStreams<R, O, E> {
    /// Requests from the client. Must be pollable.
    pub stdin: R,
    /// Re-encoded server output.
    pub stdout: O,
    /// Relayed server stderr.
    pub stderr: E,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The server process exited.
    ServerExited,
    /// A stop was requested, usually by a termination signal.
    StopRequested,
    /// The client's stdout stopped accepting writes.
    ClientGone,
}

/// Summary of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Why the session ended.
    pub reason: EndReason,
    /// The server's exit code, when it was collected.
    pub exit_code: Option<i32>,
}

/// Streams that take part in the readiness wait, in service order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Watched {
    ServerStdout,
    ServerStderr,
    ServerStdinWritable,
    ClientStdin,
}

impl Watched {
    fn interest(self) -> PollFlags {
        match self {
            Self::ServerStdinWritable => PollFlags::POLLOUT,
            Self::ServerStdout | Self::ServerStderr | Self::ClientStdin => PollFlags::POLLIN,
        }
    }

    fn ready(self, revents: PollFlags) -> bool {
        match self {
            Self::ServerStdinWritable => revents.intersects(writable_flags()),
            Self::ServerStdout | Self::ServerStderr | Self::ClientStdin => {
                revents.intersects(readable_flags())
            }
        }
    }
}

/// Relays bytes between the client and the server until the server exits,
/// a stop is requested, or the client goes away.
///
/// Client stdin is forwarded to the server unchanged, server stderr to the
/// client unchanged, and server stdout through a [`FrameAdapter`].
#[derive(Debug)]
pub struct Multiplexer<R, O, E, S> {
    server: ServerProcess,
    server_stdin: Sink<ChildStdin>,
    server_stdout: Source<ChildStdout>,
    server_stderr: Source<ChildStderr>,
    client_stdin: Source<R>,
    client_stdout: Sink<O>,
    client_stderr: Sink<E>,
    adapter: FrameAdapter,
    options: SessionOptions,
    stop: S,
}

impl<R, O, E, S> Multiplexer<R, O, E, S>
where
    R: Read + AsFd,
    O: Write,
    E: Write,
    S: StopSignal,
{
    /// Wires a spawned server to the client streams.
    pub fn new(
        server: ServerProcess,
        pipes: ServerPipes,
        client: ClientStreams<R, O, E>,
        options: SessionOptions,
        stop: S,
    ) -> Self {
        Self {
            server,
            server_stdin: Sink::new("server stdin", pipes.stdin),
            server_stdout: Source::new("server stdout", pipes.stdout),
            server_stderr: Source::new("server stderr", pipes.stderr),
            client_stdin: Source::new("client stdin", client.stdin),
            client_stdout: Sink::new("client stdout", client.stdout),
            client_stderr: Sink::new("client stderr", client.stderr),
            adapter: FrameAdapter::new(options.source_encoding),
            options,
            stop,
        }
    }

    /// Runs the session to completion.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Frame`] when the server's output is not valid
    /// framing. The server is terminated before the error is returned.
    pub fn run(mut self) -> Result<SessionOutcome, ProxyError> {
        info!(
            target: PROXY_TARGET,
            pid = self.server.pid(),
            encoding = %self.options.source_encoding,
            poll_interval_ms = self.options.poll_interval.as_millis(),
            "proxy session started"
        );

        let result = self.relay();
        if result.is_err() {
            self.server.terminate(self.options.termination_grace);
        }
        let outcome = result.map(|reason| SessionOutcome {
            reason,
            exit_code: self.server.exit_code(),
        });
        self.finish();
        outcome
    }

    fn relay(&mut self) -> Result<EndReason, ProxyError> {
        loop {
            if self.stop.stop_requested() {
                info!(target: PROXY_TARGET, "stop requested");
                self.server.terminate(self.options.termination_grace);
                return Ok(EndReason::StopRequested);
            }

            if !self.server.is_alive() {
                self.final_drain()?;
                return Ok(EndReason::ServerExited);
            }

            for stream in self.wait_for_readiness() {
                let step = match stream {
                    Watched::ServerStdout => self.pump_server_stdout()?,
                    Watched::ServerStderr => self.pump_server_stderr(),
                    Watched::ServerStdinWritable => self.flush_server_stdin(),
                    Watched::ClientStdin => self.pump_client_stdin(),
                };
                if let ControlFlow::Break(reason) = step {
                    self.server.terminate(self.options.termination_grace);
                    return Ok(reason);
                }
            }
        }
    }

    /// Blocks until at least one watched stream is ready, the poll interval
    /// elapses, or a signal interrupts the wait.
    ///
    /// Server stdin is watched only while client input is queued for it, and
    /// client stdin only while that queue has room.
    fn wait_for_readiness(&self) -> Vec<Watched> {
        let client_stdin = if self.server_stdin.pending_len() < MAX_QUEUED_INPUT {
            self.client_stdin.fd()
        } else {
            None
        };
        let candidates = [
            (Watched::ServerStdout, self.server_stdout.fd()),
            (Watched::ServerStderr, self.server_stderr.fd()),
            (Watched::ServerStdinWritable, self.server_stdin.writable_fd()),
            (Watched::ClientStdin, client_stdin),
        ];
        let (watched, mut fds): (Vec<Watched>, Vec<PollFd<'_>>) = candidates
            .into_iter()
            .filter_map(|(stream, fd)| fd.map(|fd| (stream, PollFd::new(fd, stream.interest()))))
            .unzip();

        let timeout = poll_timeout(self.options.poll_interval);
        match poll(&mut fds, timeout) {
            Ok(0) | Err(Errno::EINTR) => Vec::new(),
            Ok(_) => watched
                .into_iter()
                .zip(&fds)
                .filter(|(stream, fd)| fd.revents().is_some_and(|revents| stream.ready(revents)))
                .map(|(stream, _)| stream)
                .collect(),
            Err(errno) => {
                warn!(target: PROXY_TARGET, error = %errno, "readiness wait failed");
                Vec::new()
            }
        }
    }

    fn pump_server_stdout(&mut self) -> Result<ControlFlow<EndReason>, ProxyError> {
        let drained = self.server_stdout.drain();
        let output = self.adapter.feed(&drained.bytes)?;
        if !output.is_empty() && self.client_stdout.deliver(&output) == Delivery::Closed {
            warn!(
                target: PROXY_TARGET,
                "client stdout is no longer writable, ending session"
            );
            return Ok(ControlFlow::Break(EndReason::ClientGone));
        }
        Ok(server_stream_health(self.server_stdout.name(), &drained))
    }

    fn pump_server_stderr(&mut self) -> ControlFlow<EndReason> {
        let drained = self.server_stderr.drain();
        if !drained.bytes.is_empty() {
            // A lost stderr batch never ends the session.
            let _delivery = self.client_stderr.deliver(&drained.bytes);
        }
        server_stream_health(self.server_stderr.name(), &drained)
    }

    fn flush_server_stdin(&mut self) -> ControlFlow<EndReason> {
        if self.server_stdin.flush_pending() == Delivery::Closed {
            return server_stdin_broken();
        }
        ControlFlow::Continue(())
    }

    fn pump_client_stdin(&mut self) -> ControlFlow<EndReason> {
        let room = MAX_QUEUED_INPUT.saturating_sub(self.server_stdin.pending_len());
        let drained = self.client_stdin.drain_up_to(room);
        if !drained.bytes.is_empty()
            && self.server_stdin.deliver(&drained.bytes) == Delivery::Closed
        {
            return server_stdin_broken();
        }
        if drained.closed {
            debug!(
                target: PROXY_TARGET,
                stream = self.client_stdin.name(),
                queued = self.server_stdin.pending_len(),
                "client input finished, closing server stdin once flushed"
            );
            self.server_stdin.close_when_flushed();
        }
        ControlFlow::Continue(())
    }

    /// Forwards whatever the server wrote before exiting.
    fn final_drain(&mut self) -> Result<(), ProxyError> {
        if self.server_stdout.is_open() && self.pump_server_stdout()?.is_break() {
            debug!(target: PROXY_TARGET, "server stdout relay stopped during final drain");
        }
        if self.server_stderr.is_open() && self.pump_server_stderr().is_break() {
            debug!(target: PROXY_TARGET, "server stderr relay stopped during final drain");
        }
        Ok(())
    }

    /// Reports bytes the adapter still holds; they are never forwarded.
    fn finish(self) {
        if self.server_stdin.pending_len() > 0 {
            debug!(
                target: PROXY_TARGET,
                bytes = self.server_stdin.pending_len(),
                "discarding client input the server never read"
            );
        }
        let remainder = self.adapter.finish();
        if remainder.is_partial_frame() {
            warn!(
                target: PROXY_TARGET,
                bytes = remainder.len(),
                state = %remainder.state(),
                "discarding incomplete frame"
            );
        } else if !remainder.is_empty() {
            debug!(
                target: PROXY_TARGET,
                bytes = remainder.len(),
                "discarding trailing bytes"
            );
        }
    }
}

/// A server stream closed by repeated failures counts as the server having
/// terminated.
fn server_stream_health(stream: &str, drained: &Drained) -> ControlFlow<EndReason> {
    if drained.broken {
        warn!(
            target: PROXY_TARGET,
            stream,
            "stream failed repeatedly, treating the server as terminated"
        );
        return ControlFlow::Break(EndReason::ServerExited);
    }
    ControlFlow::Continue(())
}

fn server_stdin_broken() -> ControlFlow<EndReason> {
    warn!(
        target: PROXY_TARGET,
        stream = "server stdin",
        "stream failed repeatedly, treating the server as terminated"
    );
    ControlFlow::Break(EndReason::ServerExited)
}

/// Converts a wait bound to a poll timeout, saturating at the largest value
/// `poll` accepts.
fn poll_timeout(interval: Duration) -> PollTimeout {
    let millis = u16::try_from(interval.as_millis()).unwrap_or(u16::MAX);
    PollTimeout::from(millis)
}
