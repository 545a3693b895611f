//! Unit tests for framing, chunk handling and body re-encoding.

use encoding_rs::{GBK, SHIFT_JIS, WINDOWS_1252};
use memchr::memmem;
use rstest::rstest;

use super::{VALID_STREAMS, feed_in_chunks, frame_with_body};
use crate::{
    CONTENT_LENGTH_KEY, EncodingLabelError, Frame, FrameAdapter, FrameError, Reencoded,
    SourceEncoding, StateKind, reencode_body,
};

fn legacy_bytes(encoding: &'static encoding_rs::Encoding, text: &str) -> Vec<u8> {
    let (bytes, _, had_errors) = encoding.encode(text);
    assert!(!had_errors, "{text} is not representable in {}", encoding.name());
    bytes.into_owned()
}

#[rstest]
#[case::single_frame(0)]
#[case::extra_headers(1)]
#[case::back_to_back(2)]
#[case::interleaved_noise(3)]
#[case::leading_noise(4)]
fn complete_streams_round_trip(#[case] index: usize) {
    let input = VALID_STREAMS.get(index).expect("stream index");
    let mut adapter = FrameAdapter::default();

    let output = adapter.feed(input).expect("feed");

    assert_eq!(output, *input);
    assert_eq!(adapter.pending_len(), 0);
    assert_eq!(adapter.state(), StateKind::Initial);
}

#[rstest]
fn one_adapter_handles_consecutive_streams() {
    let mut adapter = FrameAdapter::default();
    let mut expected_frames = 0;
    for input in VALID_STREAMS {
        let output = adapter.feed(input).expect("feed");
        assert_eq!(output, *input);
        expected_frames += memmem::find_iter(input, CONTENT_LENGTH_KEY).count();
    }
    assert_eq!(expected_frames, 8);
    assert_eq!(adapter.frames_emitted(), u64::try_from(expected_frames).expect("count"));
    assert_eq!(adapter.frames_reencoded(), 0);
}

#[rstest]
fn chunked_feeding_matches_single_feed(
    #[values(0, 1, 2, 3, 4)] index: usize,
    #[values(1, 2, 3, 6, 12, 15, 16, 17, 20)] chunk_size: usize,
) {
    let input = VALID_STREAMS.get(index).expect("stream index");
    let mut adapter = FrameAdapter::default();

    let output = feed_in_chunks(&mut adapter, input, chunk_size).expect("feed");

    assert_eq!(output, *input, "chunk size {chunk_size}");
}

#[rstest]
fn empty_chunk_is_a_no_op() {
    let mut adapter = FrameAdapter::default();
    adapter.feed(b"Content-Length: 5\r\n").expect("feed");
    let pending = adapter.pending_len();

    let output = adapter.feed(b"").expect("feed");

    assert!(output.is_empty());
    assert_eq!(adapter.pending_len(), pending);
    assert_eq!(adapter.state(), StateKind::ReadingHeader);
}

#[rstest]
fn zero_length_body_is_forwarded() {
    let input = b"Content-Length: 0\r\n\r\n";
    let mut adapter = FrameAdapter::default();

    assert_eq!(adapter.feed(input).expect("feed"), input);
}

#[rstest]
fn noise_without_key_is_flushed_except_reserved_tail() {
    let noise = b"server started, listening on stdio\n";
    let mut adapter = FrameAdapter::default();

    let output = adapter.feed(noise).expect("feed");

    let flushed = noise.len() - 15;
    assert_eq!(output, noise.get(..flushed).expect("prefix"));
    assert_eq!(adapter.pending_len(), 15);
    assert_eq!(adapter.state(), StateKind::Initial);
}

#[rstest]
fn short_trailing_noise_waits_for_more_input() {
    let mut adapter = FrameAdapter::default();

    let first = adapter
        .feed(b"Content-Length: 5\r\n\r\nhello-tail")
        .expect("feed");
    assert_eq!(first, b"Content-Length: 5\r\n\r\nhello");
    assert_eq!(adapter.pending_len(), 5);

    let second = adapter.feed(b"Content-Length: 2\r\n\r\nhi").expect("feed");
    assert_eq!(second, b"-tailContent-Length: 2\r\n\r\nhi");
}

#[rstest]
fn key_split_across_reads_is_recognised() {
    let mut adapter = FrameAdapter::default();

    let mut output = adapter.feed(b"log line before Content-").expect("feed");
    assert_eq!(output, b"log line ");
    output.extend(adapter.feed(b"Length: 2\r\n\r\nhi").expect("feed"));

    assert_eq!(output, b"log line before Content-Length: 2\r\n\r\nhi");
}

#[rstest]
fn incomplete_header_waits_in_reading_header() {
    let mut adapter = FrameAdapter::default();

    let output = adapter
        .feed(b"Content-Length: 5\r\nContent-Type: x")
        .expect("feed");

    assert!(output.is_empty());
    assert_eq!(adapter.state(), StateKind::ReadingHeader);
}

#[rstest]
fn surrounding_whitespace_in_length_is_normalised() {
    let mut adapter = FrameAdapter::default();

    let output = adapter
        .feed(b"Content-Length:  5 \r\n\r\nhello")
        .expect("feed");

    assert_eq!(output, b"Content-Length: 5\r\n\r\nhello");
}

#[rstest]
#[case::letters(b"Content-Length: abc\r\n\r\nhello", "abc")]
#[case::negative(b"Content-Length: -5\r\n\r\nhello", "-5")]
#[case::empty(b"Content-Length: \r\n\r\nhello", "")]
#[case::fractional(b"Content-Length: 5.0\r\n\r\nhello", "5.0")]
fn malformed_length_is_fatal(#[case] input: &[u8], #[case] expected: &str) {
    let mut adapter = FrameAdapter::default();

    let error = adapter.feed(input).expect_err("malformed length must fail");

    assert_eq!(
        error,
        FrameError::InvalidContentLength {
            value: expected.to_owned()
        }
    );
}

#[rstest]
fn malformed_length_is_reported_once_the_line_completes() {
    let mut adapter = FrameAdapter::default();

    assert!(adapter.feed(b"Content-Length: 1x").expect("feed").is_empty());
    let result = adapter.feed(b"2\r\n");

    assert!(matches!(
        result,
        Err(FrameError::InvalidContentLength { ref value }) if value == "1x2"
    ));
}

#[rstest]
#[case::gbk_mixed(GBK, "hello world means 你好世界。")]
#[case::gbk_sentence(GBK, "这是一句长长长长长长长长长长长长长长长长长长的句子。")]
#[case::shift_jis(SHIFT_JIS, "こんにちは、世界")]
fn legacy_bodies_are_normalised_to_utf8(
    #[case] encoding: &'static encoding_rs::Encoding,
    #[case] message: &str,
    #[values(1, 7, 64)] chunk_size: usize,
) {
    let input = frame_with_body(&legacy_bytes(encoding, message));
    let expected = frame_with_body(message.as_bytes());
    let mut adapter = FrameAdapter::new(SourceEncoding::from_encoding(encoding));

    let output = feed_in_chunks(&mut adapter, &input, chunk_size).expect("feed");

    assert_eq!(output, expected);
    assert_eq!(adapter.frames_reencoded(), 1);
}

#[rstest]
#[case("hello world means 你好世界。")]
#[case("这是一句长长长长长长长长长长长长长长长长长长的句子。")]
fn canonical_source_encoding_is_idempotent(#[case] message: &str) {
    let input = frame_with_body(message.as_bytes());
    let mut adapter = FrameAdapter::new(SourceEncoding::canonical());

    assert_eq!(adapter.feed(&input).expect("feed"), input);
    assert_eq!(adapter.frames_reencoded(), 0);
}

#[rstest]
fn invalid_utf8_passes_through_under_canonical_encoding() {
    let input = frame_with_body(&[0xFF, 0xFE, b'x']);
    let mut adapter = FrameAdapter::default();

    assert_eq!(adapter.feed(&input).expect("feed"), input);
}

#[rstest]
fn undecodable_body_is_forwarded_verbatim() {
    let input = frame_with_body(&[0x81, b' ', b'o', b'k']);
    let mut adapter = FrameAdapter::new(SourceEncoding::from_encoding(GBK));

    assert_eq!(adapter.feed(&input).expect("feed"), input);
    assert_eq!(adapter.frames_reencoded(), 0);
}

#[rstest]
fn ascii_body_under_legacy_encoding_is_untouched() {
    let input = frame_with_body(br#"{"jsonrpc":"2.0","id":1,"result":null}"#);
    let mut adapter = FrameAdapter::new(SourceEncoding::from_encoding(GBK));

    assert_eq!(adapter.feed(&input).expect("feed"), input);
}

#[rstest]
fn mixed_frames_convert_only_multibyte_bodies() {
    let mut input = frame_with_body(b"hello");
    input.extend(frame_with_body(&legacy_bytes(GBK, "你好")));
    let mut expected = frame_with_body(b"hello");
    expected.extend(frame_with_body("你好".as_bytes()));
    let mut adapter = FrameAdapter::new(SourceEncoding::from_encoding(GBK));

    assert_eq!(adapter.feed(&input).expect("feed"), expected);
    assert_eq!(adapter.frames_emitted(), 2);
    assert_eq!(adapter.frames_reencoded(), 1);
}

#[rstest]
fn extra_headers_survive_reencoding() {
    let body = legacy_bytes(GBK, "你好");
    let mut input = format!(
        "Content-Length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=gbk\r\n\r\n",
        body.len()
    )
    .into_bytes();
    input.extend_from_slice(&body);
    let mut adapter = FrameAdapter::new(SourceEncoding::from_encoding(GBK));

    let output = adapter.feed(&input).expect("feed");

    let mut expected =
        b"Content-Length: 6\r\nContent-Type: application/vscode-jsonrpc; charset=gbk\r\n\r\n"
            .to_vec();
    expected.extend_from_slice("你好".as_bytes());
    assert_eq!(output, expected);
}

#[rstest]
fn single_byte_text_keeps_its_source_bytes() {
    let body = vec![b'c', b'a', b'f', 0xE9];

    let outcome = reencode_body(SourceEncoding::from_encoding(WINDOWS_1252), body.clone());

    assert_eq!(outcome, Reencoded::Unchanged(body));
}

#[rstest]
fn reencode_reports_conversion() {
    let outcome = reencode_body(
        SourceEncoding::from_encoding(GBK),
        legacy_bytes(GBK, "你好"),
    );

    assert!(outcome.is_converted());
    assert_eq!(outcome.as_str(), "converted");
    assert_eq!(outcome.into_bytes(), "你好".as_bytes());
}

#[rstest]
fn frame_encodes_recomputed_length() {
    let frame = Frame::new(b"X-Trace: 1\r\n".to_vec(), "你好".as_bytes().to_vec());
    let mut out = Vec::new();

    frame.encode_into(&mut out);

    let mut expected = b"Content-Length: 6\r\nX-Trace: 1\r\n\r\n".to_vec();
    expected.extend_from_slice("你好".as_bytes());
    assert_eq!(out, expected);
    assert_eq!(frame.content_length(), 6);
}

#[rstest]
fn finish_reports_an_incomplete_frame() {
    let mut adapter = FrameAdapter::default();
    adapter.feed(b"Content-Length: 10\r\n\r\nhel").expect("feed");

    let remainder = adapter.finish();

    assert_eq!(remainder.state(), StateKind::ReadingBody);
    assert_eq!(remainder.bytes(), b"hel");
    assert!(remainder.is_partial_frame());
}

#[rstest]
fn finish_reports_held_noise() {
    let mut adapter = FrameAdapter::default();
    adapter.feed(b"Content-Length: 2\r\n\r\nhi\n").expect("feed");

    let remainder = adapter.finish();

    assert_eq!(remainder.len(), 1);
    assert!(!remainder.is_partial_frame());
}

#[rstest]
#[case::utf8("utf-8", "UTF-8")]
#[case::alias("utf8", "UTF-8")]
#[case::gbk("gbk", "GBK")]
#[case::gb2312("gb2312", "GBK")]
#[case::shift_jis(" shift_jis ", "Shift_JIS")]
#[case::latin1("latin1", "windows-1252")]
fn labels_resolve_to_encodings(#[case] label: &str, #[case] name: &str) {
    let encoding: SourceEncoding = label.parse().expect("label");

    assert_eq!(encoding.name(), name);
    assert_eq!(encoding.to_string(), name);
}

#[rstest]
fn unknown_label_is_rejected() {
    let error = SourceEncoding::from_label("klingon").expect_err("unknown label");

    assert_eq!(
        error,
        EncodingLabelError::Unknown {
            label: String::from("klingon")
        }
    );
}

#[rstest]
fn replacement_label_is_rejected() {
    let error = SourceEncoding::from_label("iso-2022-kr").expect_err("replacement label");

    assert!(matches!(error, EncodingLabelError::Unsupported { .. }));
}

#[rstest]
fn default_encoding_is_canonical() {
    assert!(SourceEncoding::default().is_canonical());
    assert!(!SourceEncoding::from_encoding(GBK).is_canonical());
}
