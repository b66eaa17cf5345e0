//! Terminal detection for the CLI.

use std::io::{self, IsTerminal};

pub fn is_stdin_tty() -> bool {
    io::stdin().is_terminal()
}

/// Print status message to stderr if running in a terminal.
pub fn status(message: &str) {
    if io::stderr().is_terminal() {
        eprintln!("{}", message);
    }
}
