//! The wire form of a single `Content-Length` framed message.

/// Header key that opens every frame, including the trailing space.
pub const CONTENT_LENGTH_KEY: &[u8] = b"Content-Length: ";

/// Terminator of a single header line.
pub const HEADER_LINE_END: &[u8] = b"\r\n";

/// Separator between the header block and the body.
pub const HEADERS_END: &[u8] = b"\r\n\r\n";

/// One complete frame.
///
/// `extra_headers` holds every header line after the `Content-Length` line,
/// each with its own line terminator, exactly as the server wrote them. The
/// blank line that ends the header block is not part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    extra_headers: Vec<u8>,
    body: Vec<u8>,
}

impl Frame {
    /// Builds a frame from its verbatim extra headers and body.
    #[must_use]
    pub const fn new(extra_headers: Vec<u8>, body: Vec<u8>) -> Self {
        Self {
            extra_headers,
            body,
        }
    }

    /// Header lines forwarded verbatim after the `Content-Length` line.
    #[must_use]
    pub fn extra_headers(&self) -> &[u8] {
        &self.extra_headers
    }

    /// Body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Byte length written in the `Content-Length` header.
    #[must_use]
    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    /// Appends the wire form of the frame to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(CONTENT_LENGTH_KEY);
        out.extend_from_slice(self.content_length().to_string().as_bytes());
        out.extend_from_slice(HEADER_LINE_END);
        out.extend_from_slice(&self.extra_headers);
        out.extend_from_slice(HEADER_LINE_END);
        out.extend_from_slice(&self.body);
    }
}
