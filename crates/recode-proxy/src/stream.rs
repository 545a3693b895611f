//! Non-blocking draining of readable streams and failure-counted sinks.
//!
//! A read is only issued after a zero-timeout readiness check reports data
//! (or hang-up), so it never blocks. Sinks queue whatever their writer does
//! not accept at once; the server's stdin is switched to non-blocking mode so
//! a full pipe leaves bytes queued instead of stalling the relay.

use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::{debug, trace, warn};

use crate::PROXY_TARGET;

/// Bytes requested by each read.
pub(crate) const READ_CHUNK_SIZE: usize = 1024;

/// Consecutive failures after which a stream is closed.
pub(crate) const MAX_CONSECUTIVE_FAILURES: u8 = 3;

/// Readiness flags that make a read worthwhile: data, or an end of stream to
/// observe.
pub(crate) fn readable_flags() -> PollFlags {
    PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR
}

/// Readiness flags that make a write attempt worthwhile.
pub(crate) fn writable_flags() -> PollFlags {
    PollFlags::POLLOUT | PollFlags::POLLHUP | PollFlags::POLLERR
}

/// Puts `fd` in non-blocking mode, keeping its other status flags.
pub(crate) fn set_nonblocking(fd: BorrowedFd<'_>) -> nix::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

/// Checks whether `fd` can be read without blocking.
fn ready_now(fd: BorrowedFd<'_>) -> bool {
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::ZERO) {
        Ok(0) | Err(Errno::EINTR) => false,
        Ok(_) => fds
            .first()
            .and_then(|fd| fd.revents())
            .is_some_and(|revents| revents.intersects(readable_flags())),
        Err(errno) => {
            warn!(target: PROXY_TARGET, error = %errno, "readiness check failed");
            false
        }
    }
}

/// Bytes collected by one drain.
#[derive(Debug, Default)]
pub(crate) struct Drained {
    pub(crate) bytes: Vec<u8>,
    /// The source reached end of file or failed for good.
    pub(crate) closed: bool,
    /// The source was closed by repeated read failures.
    pub(crate) broken: bool,
}

/// A readable stream that is dropped once it reaches end of file.
#[derive(Debug)]
pub(crate) struct Source<R> {
    name: &'static str,
    reader: Option<R>,
    failures: u8,
}

impl<R: Read + AsFd> Source<R> {
    pub(crate) const fn new(name: &'static str, reader: R) -> Self {
        Self {
            name,
            reader: Some(reader),
            failures: 0,
        }
    }

    pub(crate) const fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) const fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Descriptor to include in the readiness wait, if still open.
    pub(crate) fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.reader.as_ref().map(AsFd::as_fd)
    }

    /// Reads everything that is immediately available.
    pub(crate) fn drain(&mut self) -> Drained {
        self.drain_up_to(usize::MAX)
    }

    /// Reads what is immediately available, stopping after `limit` bytes.
    ///
    /// End of file and repeated failures close the source; a single failure
    /// ends the drain like an end of file but leaves the source open.
    pub(crate) fn drain_up_to(&mut self, limit: usize) -> Drained {
        let mut drained = Drained::default();
        let mut chunk = [0_u8; READ_CHUNK_SIZE];

        while let Some(reader) = self.reader.as_mut() {
            let room = limit.saturating_sub(drained.bytes.len()).min(READ_CHUNK_SIZE);
            if room == 0 || !ready_now(reader.as_fd()) {
                break;
            }
            let buffer = chunk.get_mut(..room).unwrap_or_default();
            match reader.read(buffer) {
                Ok(0) => {
                    debug!(target: PROXY_TARGET, stream = self.name, "end of stream");
                    self.close();
                    drained.closed = true;
                }
                Ok(count) => {
                    self.failures = 0;
                    drained
                        .bytes
                        .extend_from_slice(chunk.get(..count).unwrap_or_default());
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) => {
                    let closed = self.record_failure(&error);
                    drained.closed = closed;
                    drained.broken = closed;
                    break;
                }
            }
        }

        if !drained.bytes.is_empty() {
            trace!(
                target: PROXY_TARGET,
                stream = self.name,
                bytes = drained.bytes.len(),
                payload = %String::from_utf8_lossy(&drained.bytes),
                "stream drained"
            );
        }
        drained
    }

    pub(crate) fn close(&mut self) {
        self.reader = None;
    }

    fn record_failure(&mut self, error: &io::Error) -> bool {
        self.failures += 1;
        warn!(
            target: PROXY_TARGET,
            stream = self.name,
            error = %error,
            failures = self.failures,
            "read failed"
        );
        if self.failures >= MAX_CONSECUTIVE_FAILURES {
            self.close();
            return true;
        }
        false
    }
}

/// Result of handing one batch to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Written, or queued until the writer accepts more.
    Delivered,
    /// The write failed; the queued bytes are lost but the sink stays open.
    Failed,
    /// The sink is closed, either already or because of this failure.
    Closed,
}

/// A writable stream with a queue for bytes the writer has not accepted yet.
///
/// Closed after repeated failures.
#[derive(Debug)]
pub(crate) struct Sink<W> {
    name: &'static str,
    writer: Option<W>,
    pending: Vec<u8>,
    failures: u8,
    close_when_flushed: bool,
}

impl<W: Write> Sink<W> {
    pub(crate) const fn new(name: &'static str, writer: W) -> Self {
        Self {
            name,
            writer: Some(writer),
            pending: Vec::new(),
            failures: 0,
            close_when_flushed: false,
        }
    }

    /// Bytes queued but not yet accepted by the writer.
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Queues the batch and writes as much of the queue as the writer takes.
    pub(crate) fn deliver(&mut self, bytes: &[u8]) -> Delivery {
        if self.writer.is_none() {
            debug!(
                target: PROXY_TARGET,
                stream = self.name,
                bytes = bytes.len(),
                "dropping bytes for closed stream"
            );
            return Delivery::Closed;
        }
        self.pending.extend_from_slice(bytes);
        self.flush_pending()
    }

    /// Writes queued bytes until the queue is empty or the writer would
    /// block, then flushes.
    pub(crate) fn flush_pending(&mut self) -> Delivery {
        let Some(writer) = self.writer.as_mut() else {
            return Delivery::Closed;
        };

        let (written, result) = write_available(writer, &self.pending);
        self.pending.drain(..written);

        match result {
            Ok(()) => {
                self.failures = 0;
                if self.close_when_flushed && self.pending.is_empty() {
                    self.close();
                }
                Delivery::Delivered
            }
            Err(error) => {
                self.failures += 1;
                warn!(
                    target: PROXY_TARGET,
                    stream = self.name,
                    error = %error,
                    failures = self.failures,
                    lost = self.pending.len(),
                    "write failed"
                );
                self.pending.clear();
                if self.failures >= MAX_CONSECUTIVE_FAILURES {
                    self.close();
                    Delivery::Closed
                } else {
                    Delivery::Failed
                }
            }
        }
    }

    /// Closes the sink once the queue has been written out.
    pub(crate) fn close_when_flushed(&mut self) {
        self.close_when_flushed = true;
        if self.pending.is_empty() {
            self.close();
        }
    }

    /// Drops the writer, closing the underlying descriptor if owned.
    ///
    /// Queued bytes are discarded.
    pub(crate) fn close(&mut self) {
        if self.writer.take().is_some() {
            if !self.pending.is_empty() {
                debug!(
                    target: PROXY_TARGET,
                    stream = self.name,
                    bytes = self.pending.len(),
                    "discarding queued bytes"
                );
                self.pending.clear();
            }
            debug!(target: PROXY_TARGET, stream = self.name, "stream closed");
        }
    }
}

impl<W: AsFd> Sink<W> {
    /// Descriptor to watch for writability while bytes are queued.
    pub(crate) fn writable_fd(&self) -> Option<BorrowedFd<'_>> {
        if self.pending.is_empty() {
            return None;
        }
        self.writer.as_ref().map(AsFd::as_fd)
    }
}

/// Writes from `bytes` until everything is written, the writer would block,
/// or a write fails. Returns the number of bytes written.
fn write_available<W: Write>(writer: &mut W, bytes: &[u8]) -> (usize, io::Result<()>) {
    let mut written = 0;
    while let Some(rest) = bytes.get(written..).filter(|rest| !rest.is_empty()) {
        match writer.write(rest) {
            Ok(0) => return (written, Err(io::Error::from(io::ErrorKind::WriteZero))),
            Ok(count) => written += count,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => return (written, Ok(())),
            Err(error) => return (written, Err(error)),
        }
    }
    (written, writer.flush())
}
