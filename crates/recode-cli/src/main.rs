//! Entry point for the `lsp-recode` binary.
//!
//! Delegates to [`recode_cli::run`], which parses the configuration, starts
//! the language server and relays its streams until it exits.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    recode_cli::run(std::env::args_os(), io::stdout(), io::stderr())
}
