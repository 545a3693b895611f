//! Incremental `Content-Length` frame parser and body re-encoder.
//!
//! The crate sits on the server-to-client direction of the `lsp-recode`
//! proxy. A [`FrameAdapter`] consumes the raw bytes a language server writes
//! to its stdout, in whatever chunks the pipe delivers them, and returns the
//! equivalent byte stream with every frame body converted from the configured
//! [`SourceEncoding`] to UTF-8 and every `Content-Length` recomputed.
//!
//! Bytes that are not part of a frame (log lines a server prints to stdout,
//! banners, stray output between messages) are forwarded unchanged and in
//! place. The adapter performs no I/O; it only owns two byte buffers and a
//! [`ParserState`].
//!
//! # Example
//!
//! ```rust
//! use recode_frame::{FrameAdapter, SourceEncoding};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let encoding: SourceEncoding = "gbk".parse()?;
//! let mut adapter = FrameAdapter::new(encoding);
//!
//! let mut output = adapter.feed(b"Content-Length: 4\r\n\r\n")?;
//! output.extend(adapter.feed(&[0xC4, 0xE3, 0xBA, 0xC3])?);
//!
//! assert_eq!(output, "Content-Length: 6\r\n\r\n你好".as_bytes());
//! # Ok(())
//! # }
//! ```

mod adapter;
mod encoding;
mod error;
mod frame;
mod state;

#[cfg(test)]
mod tests;

pub use adapter::{FrameAdapter, Remainder};
pub use encoding::{EncodingLabelError, Reencoded, SourceEncoding, reencode_body};
pub use error::FrameError;
pub use frame::{CONTENT_LENGTH_KEY, Frame, HEADER_LINE_END, HEADERS_END};
pub use state::{ParserState, StateKind};
