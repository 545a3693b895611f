//! Errors raised while parsing the server's output stream.

use thiserror::Error;

/// Fatal framing errors.
///
/// Any error leaves the adapter's buffers in an undefined position relative
/// to the frame boundaries, so the adapter must be discarded with the
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The `Content-Length` header value is not a decimal byte count.
    #[error("invalid Content-Length value '{value}'")]
    InvalidContentLength {
        /// Raw header value, lossily decoded.
        value: String,
    },
}
