//! Parser states of the frame adapter.

use std::fmt;

/// Position of the adapter within the frame grammar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParserState {
    /// Waiting for enough bytes to hold a `Content-Length` key.
    #[default]
    Initial,
    /// Looking for the `Content-Length` key and the end of the header block.
    ReadingHeader,
    /// Header block consumed; waiting for `body_length` body bytes.
    ReadingBody {
        /// Declared byte length of the body.
        body_length: usize,
        /// Header lines after `Content-Length`, forwarded verbatim.
        extra_headers: Vec<u8>,
    },
}

impl ParserState {
    /// Returns the payload-free kind of this state.
    #[must_use]
    pub const fn kind(&self) -> StateKind {
        match self {
            Self::Initial => StateKind::Initial,
            Self::ReadingHeader => StateKind::ReadingHeader,
            Self::ReadingBody { .. } => StateKind::ReadingBody,
        }
    }
}

/// Payload-free view of [`ParserState`], used in logs and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// See [`ParserState::Initial`].
    Initial,
    /// See [`ParserState::ReadingHeader`].
    ReadingHeader,
    /// See [`ParserState::ReadingBody`].
    ReadingBody,
}

impl StateKind {
    /// Returns the lowercase identifier for this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::ReadingHeader => "reading_header",
            Self::ReadingBody => "reading_body",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
