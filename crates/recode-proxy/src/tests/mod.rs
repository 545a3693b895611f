//! Tests driving real child processes through the proxy.


use std::io::{self, PipeReader, Write};
use std::time::Duration;

use recode_frame::SourceEncoding;

use crate::{ClientStreams, ProxyError, ServerCommand, SessionOptions, SessionOutcome};

/// Options that keep test sessions short.
fn fast_options() -> SessionOptions {
    SessionOptions {
        termination_grace: Duration::from_millis(200),
        ..SessionOptions::new(SourceEncoding::canonical(), Duration::from_millis(20))
    }
}

/// Runs `script` under `sh -c`.
fn sh(script: &str) -> ServerCommand {
    ServerCommand::new("sh", ["-c", script])
}

/// Client stdin that yields `input` and then end of file.
fn closed_stdin(input: &[u8]) -> PipeReader {
    let (reader, mut writer) = io::pipe().expect("pipe");
    writer.write_all(input).expect("write client input");
    drop(writer);
    reader
}

/// Captured result of one session.
struct Captured {
    result: Result<SessionOutcome, ProxyError>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Captured {
    fn outcome(&self) -> SessionOutcome {
        match &self.result {
            Ok(outcome) => *outcome,
            Err(error) => panic!("session failed: {error}"),
        }
    }
}

/// Runs a session whose client writes `input` and then closes stdin.
fn run_captured(command: &ServerCommand, input: &[u8], options: SessionOptions) -> Captured {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let client = ClientStreams {
        stdin: closed_stdin(input),
        stdout: &mut stdout,
        stderr: &mut stderr,
    };
    let result = crate::run_session(command, client, options, false_flag());
    Captured {
        result,
        stdout,
        stderr,
    }
}

fn false_flag() -> std::sync::atomic::AtomicBool {
    std::sync::atomic::AtomicBool::new(false)
}

/// Builds a frame whose `Content-Length` matches `body`.
fn frame_with_body(body: &[u8]) -> Vec<u8> {
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(body);
    frame
}
