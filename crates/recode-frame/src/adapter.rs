//! Resumable state machine that re-frames the server's output stream.

use memchr::memmem;
use tracing::{debug, trace};

use crate::encoding::{SourceEncoding, reencode_body};
use crate::error::FrameError;
use crate::frame::{CONTENT_LENGTH_KEY, Frame, HEADER_LINE_END, HEADERS_END};
use crate::state::{ParserState, StateKind};

/// Log target for frame adapter operations.
const FRAME_TARGET: &str = "recode_frame::adapter";

/// Trailing bytes held back when the key is absent, since they may be the
/// start of a key split across reads.
const KEY_TAIL_LEN: usize = CONTENT_LENGTH_KEY.len() - 1;

/// Outcome of a single state transition.
enum Transition {
    /// Run the next state immediately.
    Continue(ParserState),
    /// Stop and wait for more input in the given state.
    Wait(ParserState),
}

/// Incremental parser and re-encoder for `Content-Length` framed output.
///
/// Feed it every chunk read from the server's stdout, in order. Each call
/// returns the bytes that can be forwarded to the client so far; anything
/// that cannot be decided yet stays buffered for the next call.
///
/// # Example
///
/// ```rust
/// use recode_frame::FrameAdapter;
///
/// # fn main() -> Result<(), recode_frame::FrameError> {
/// let mut adapter = FrameAdapter::default();
/// let mut output = Vec::new();
/// for chunk in b"Content-Length: 5\r\n\r\nhello".chunks(3) {
///     output.extend(adapter.feed(chunk)?);
/// }
/// assert_eq!(output, b"Content-Length: 5\r\n\r\nhello");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct FrameAdapter {
    encoding: SourceEncoding,
    state: ParserState,
    raw: Vec<u8>,
    output: Vec<u8>,
    frames_emitted: u64,
    frames_reencoded: u64,
}

impl FrameAdapter {
    /// Creates an adapter that assumes bodies are written in `encoding`.
    #[must_use]
    pub fn new(encoding: SourceEncoding) -> Self {
        Self {
            encoding,
            ..Self::default()
        }
    }

    /// Returns the configured source encoding.
    #[must_use]
    pub const fn encoding(&self) -> SourceEncoding {
        self.encoding
    }

    /// Returns the current parser state.
    #[must_use]
    pub const fn state(&self) -> StateKind {
        self.state.kind()
    }

    /// Returns the number of raw bytes retained for the next call.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.raw.len()
    }

    /// Returns the number of frames emitted so far.
    #[must_use]
    pub const fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Returns the number of emitted frames whose body was converted.
    #[must_use]
    pub const fn frames_reencoded(&self) -> u64 {
        self.frames_reencoded
    }

    /// Consumes a chunk of server output and returns the bytes ready for the
    /// client.
    ///
    /// An empty chunk is a no-op and returns no bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidContentLength`] when a `Content-Length`
    /// value is not a decimal integer. The adapter must not be fed again
    /// after an error.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<u8>, FrameError> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }

        self.raw.extend_from_slice(chunk);
        trace!(
            target: FRAME_TARGET,
            state = %self.state.kind(),
            bytes = chunk.len(),
            pending = self.raw.len(),
            "chunk received"
        );

        self.process()?;
        Ok(std::mem::take(&mut self.output))
    }

    /// Ends the session and hands back whatever was still buffered.
    ///
    /// The retained bytes are never forwarded: they are either a reserved
    /// key prefix or an incomplete frame.
    #[must_use]
    pub fn finish(self) -> Remainder {
        Remainder {
            state: self.state.kind(),
            bytes: self.raw,
        }
    }

    /// Runs transitions until one of them needs more input.
    fn process(&mut self) -> Result<(), FrameError> {
        loop {
            let transition = match std::mem::take(&mut self.state) {
                ParserState::Initial => self.step_initial(),
                ParserState::ReadingHeader => match self.step_header() {
                    Ok(transition) => transition,
                    Err(error) => {
                        self.state = ParserState::ReadingHeader;
                        return Err(error);
                    }
                },
                ParserState::ReadingBody {
                    body_length,
                    extra_headers,
                } => self.step_body(body_length, extra_headers),
            };

            match transition {
                Transition::Continue(next) => self.state = next,
                Transition::Wait(next) => {
                    self.state = next;
                    return Ok(());
                }
            }
        }
    }

    fn step_initial(&self) -> Transition {
        if self.raw.len() > CONTENT_LENGTH_KEY.len() {
            Transition::Continue(ParserState::ReadingHeader)
        } else {
            Transition::Wait(ParserState::Initial)
        }
    }

    fn step_header(&mut self) -> Result<Transition, FrameError> {
        let Some(key_start) = memmem::find(&self.raw, CONTENT_LENGTH_KEY) else {
            let flush_end = self.raw.len().saturating_sub(KEY_TAIL_LEN);
            self.pass_through(flush_end);
            return Ok(Transition::Wait(ParserState::Initial));
        };

        if key_start > 0 {
            self.pass_through(key_start);
        }

        let Some(line_end) = memmem::find(&self.raw, HEADER_LINE_END) else {
            return Ok(Transition::Wait(ParserState::ReadingHeader));
        };
        let value = self
            .raw
            .get(CONTENT_LENGTH_KEY.len()..line_end)
            .unwrap_or_default();
        let body_length = parse_content_length(value)?;

        let Some(separator) = memmem::find(&self.raw, HEADERS_END) else {
            return Ok(Transition::Wait(ParserState::ReadingHeader));
        };

        let headers_start = line_end + HEADER_LINE_END.len();
        let headers_end = separator + HEADER_LINE_END.len();
        let extra_headers = self
            .raw
            .get(headers_start..headers_end)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        drop(self.take_front(separator + HEADERS_END.len()));

        trace!(
            target: FRAME_TARGET,
            body_length,
            extra_header_bytes = extra_headers.len(),
            "header block parsed"
        );

        Ok(Transition::Continue(ParserState::ReadingBody {
            body_length,
            extra_headers,
        }))
    }

    fn step_body(&mut self, body_length: usize, extra_headers: Vec<u8>) -> Transition {
        if self.raw.len() < body_length {
            return Transition::Wait(ParserState::ReadingBody {
                body_length,
                extra_headers,
            });
        }

        let body = self.take_front(body_length);
        let outcome = reencode_body(self.encoding, body);
        let converted = outcome.is_converted();
        let outcome_label = outcome.as_str();
        let frame = Frame::new(extra_headers, outcome.into_bytes());
        frame.encode_into(&mut self.output);

        self.frames_emitted += 1;
        if converted {
            self.frames_reencoded += 1;
        }
        debug!(
            target: FRAME_TARGET,
            original_length = body_length,
            content_length = frame.content_length(),
            outcome = outcome_label,
            encoding = %self.encoding,
            "frame emitted"
        );

        Transition::Continue(ParserState::Initial)
    }

    /// Moves the first `len` raw bytes to the output untouched.
    fn pass_through(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        let noise = self.take_front(len);
        trace!(
            target: FRAME_TARGET,
            bytes = noise.len(),
            "forwarding bytes outside any frame"
        );
        self.output.extend_from_slice(&noise);
    }

    /// Removes and returns up to `len` bytes from the front of the raw buffer.
    fn take_front(&mut self, len: usize) -> Vec<u8> {
        let rest = self.raw.split_off(len.min(self.raw.len()));
        std::mem::replace(&mut self.raw, rest)
    }
}

/// Bytes still buffered when a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remainder {
    state: StateKind,
    bytes: Vec<u8>,
}

impl Remainder {
    /// Parser state the session ended in.
    #[must_use]
    pub const fn state(&self) -> StateKind {
        self.state
    }

    /// The discarded bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of discarded bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true when nothing was left over.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns true when the session ended part-way through a frame.
    #[must_use]
    pub fn is_partial_frame(&self) -> bool {
        match self.state {
            StateKind::ReadingBody => true,
            StateKind::ReadingHeader => !self.bytes.is_empty(),
            StateKind::Initial => self.bytes.starts_with(CONTENT_LENGTH_KEY),
        }
    }
}

/// Parses the decimal value of a `Content-Length` header.
fn parse_content_length(value: &[u8]) -> Result<usize, FrameError> {
    std::str::from_utf8(value.trim_ascii())
        .ok()
        .and_then(|digits| digits.parse::<usize>().ok())
        .ok_or_else(|| FrameError::InvalidContentLength {
            value: String::from_utf8_lossy(value).into_owned(),
        })
}
