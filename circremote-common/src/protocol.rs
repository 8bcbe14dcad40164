// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Raw REPL wire protocol shared by every transport.
//!
//! The firmware-facing byte sequence is fixed: interrupt, enter raw mode, send the
//! program wrapped in two sentinel prints, then exit raw mode. Nothing here performs
//! I/O; the session driver walks [`handshake`] and writes each step to a transport.

use std::time::Duration;

// --- Control bytes ---

/// Ctrl-C, interrupts the running program.
pub const CTRL_C: &str = "\x03";
/// Ctrl-A, enters raw REPL mode.
pub const CTRL_A: &str = "\x01";
/// Ctrl-B, returns to the friendly (interactive) REPL.
pub const CTRL_B: &str = "\x02";
/// Ctrl-D, executes the pasted block and leaves raw mode.
pub const CTRL_D: &str = "\x04";

/// Three Ctrl-C in one write, enough to break out of nested `try` blocks.
pub const INTERRUPT: &str = "\x03\x03\x03";

// --- Sentinels ---

pub const START_MARKER: &str = "***START***";
pub const END_MARKER: &str = "***END***";

/// Source line that prints the start sentinel.
pub const START_LINE: &str = "print('***START***')\r\n";
/// Source line that prints the end sentinel.
pub const END_LINE: &str = "print('***END***')\r\n";

// --- Timing ---

/// Settle time after the interrupt burst.
pub const INTERRUPT_SETTLE: Duration = Duration::from_millis(500);
/// Settle time after entering raw mode.
pub const RAW_MODE_SETTLE: Duration = Duration::from_millis(500);
/// Gap between Ctrl-D and Ctrl-B on exit.
pub const EXIT_GAP: Duration = Duration::from_millis(100);
/// Delay before the optional second Ctrl-D.
pub const DOUBLE_EXIT_DELAY: Duration = Duration::from_secs(10);

/// Default capture timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Sleep between polls while waiting for output.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Maximum bytes requested per serial poll.
pub const READ_CHUNK: usize = 1024;

// --- Transport settings ---

pub const SERIAL_BAUD_RATE: u32 = 115_200;
pub const SERIAL_READ_TIMEOUT: Duration = Duration::from_secs(1);
pub const WEBSOCKET_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const WEBSOCKET_DEFAULT_PORT: u16 = 80;
pub const WEBSOCKET_TLS_PORT: u16 = 443;
pub const WEBSOCKET_PATH: &str = "/cp/serial/";

/// One step of the raw REPL handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Write text to the transport.
    Write(String),
    /// Flush pending output.
    Flush,
    /// Sleep before the next step.
    Wait(Duration),
}

/// Rewrite bare `\n` line endings to `\r\n` for the firmware line editor.
///
/// Existing `\r\n` pairs are left alone.
pub fn to_crlf(program: &str) -> String {
    let mut out = String::with_capacity(program.len() + program.len() / 16);
    let mut prev = '\0';
    for ch in program.chars() {
        if ch == '\n' && prev != '\r' {
            out.push('\r');
        }
        out.push(ch);
        prev = ch;
    }
    out
}

/// Build the full handshake for `program`, in wire order.
pub fn handshake(program: &str) -> Vec<Step> {
    vec![
        Step::Write(INTERRUPT.to_string()),
        Step::Wait(INTERRUPT_SETTLE),
        Step::Write(CTRL_A.to_string()),
        Step::Wait(RAW_MODE_SETTLE),
        Step::Write(START_LINE.to_string()),
        Step::Flush,
        Step::Write(to_crlf(program)),
        Step::Flush,
        Step::Write(END_LINE.to_string()),
        Step::Flush,
        Step::Write(CTRL_D.to_string()),
        Step::Wait(EXIT_GAP),
        Step::Write(CTRL_B.to_string()),
        Step::Flush,
    ]
}

/// Concatenate every `Write` step, i.e. the exact bytes the firmware receives.
pub fn wire_bytes(steps: &[Step]) -> String {
    steps
        .iter()
        .filter_map(|step| match step {
            Step::Write(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}
