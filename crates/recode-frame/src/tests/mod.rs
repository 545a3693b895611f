//! Unit and behavioural tests for the frame adapter.

mod unit;

use crate::{FrameAdapter, FrameError};

/// Well-formed server output streams in the canonical encoding.
const VALID_STREAMS: &[&[u8]] = &[
    b"Content-Length: 5\r\n\r\nhello",
    b"Content-Length: 5\r\nxxxxxxx\r\n\r\nhello",
    b"Content-Length: 5\r\n\r\nhelloContent-Length: 5\r\nxxxxxxx\r\n\r\nhello",
    b"Content-Length: 5\r\n\r\nhello-----non lsp content-----Content-Length: 5\r\nxxxxxxx\r\n\r\nhello",
    b"foobarContent-Length: 5\r\n\r\nhello-----non lsp content-----Content-Length: 5\r\nxxxxxxx\r\n\r\nhello",
];

/// Feeds `input` in consecutive chunks of `chunk_size` bytes and collects the
/// output of every call.
fn feed_in_chunks(
    adapter: &mut FrameAdapter,
    input: &[u8],
    chunk_size: usize,
) -> Result<Vec<u8>, FrameError> {
    let mut output = Vec::new();
    for chunk in input.chunks(chunk_size) {
        output.extend(adapter.feed(chunk)?);
    }
    Ok(output)
}

/// Builds a frame whose `Content-Length` matches `body`.
fn frame_with_body(body: &[u8]) -> Vec<u8> {
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(body);
    frame
}
