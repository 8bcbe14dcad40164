// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Raw REPL session: handshake, output capture, teardown.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use tracing::{debug, trace, warn};

use circremote_common::protocol::{
    self, Step, CTRL_D, DOUBLE_EXIT_DELAY, POLL_INTERVAL, READ_CHUNK,
};
use circremote_common::Capture;

use crate::error::TransportError;
use crate::transport::{Transport, TransportKind};

/// Caller-supplied session settings.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Capture deadline; `None` waits until the end marker arrives.
    pub timeout: Option<Duration>,
    /// Send one more Ctrl-D after capture, for firmware that needs a second nudge.
    pub double_exit: bool,
    /// Sleep used for protocol delays.
    pub pause: fn(Duration),
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: Some(protocol::DEFAULT_TIMEOUT),
            double_exit: false,
            pause: thread::sleep,
        }
    }
}

impl SessionOptions {
    /// Build options from a timeout in seconds, where zero means no deadline.
    ///
    /// Values too large for a [`Duration`] also mean no deadline.
    pub fn from_secs(timeout_secs: f64, double_exit: bool) -> Self {
        let timeout = if timeout_secs > 0.0 {
            Duration::try_from_secs_f64(timeout_secs).ok()
        } else {
            None
        };
        Self {
            timeout,
            double_exit,
            ..Self::default()
        }
    }
}

/// How the capture ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The end marker was seen.
    Completed,
    /// The deadline passed first.
    TimedOut,
    /// The operator pressed Ctrl-C.
    Interrupted,
    /// The device closed the console before the end marker.
    Disconnected,
}

/// Run the raw REPL handshake for `program`.
pub fn send_program(
    transport: &mut dyn Transport,
    program: &str,
    options: &SessionOptions,
    progress: &ProgressBar,
) -> Result<(), TransportError> {
    debug!(
        bytes = program.len(),
        lines = program.lines().count(),
        "transmitting program"
    );

    for step in protocol::handshake(program) {
        match step {
            Step::Write(text) => {
                progress.set_message(describe(&text));
                trace!(data = ?text, "write");
                transport.write(&text)?;
            }
            Step::Flush => transport.flush()?,
            Step::Wait(delay) => (options.pause)(delay),
        }
    }

    debug!("REPL exit sequence complete");
    progress.finish_and_clear();
    Ok(())
}

fn describe(text: &str) -> String {
    match text {
        protocol::INTERRUPT => "Interrupting running program".to_string(),
        protocol::CTRL_A => "Entering raw REPL".to_string(),
        protocol::START_LINE => "Sending start marker".to_string(),
        protocol::END_LINE => "Sending end marker".to_string(),
        protocol::CTRL_D | protocol::CTRL_B => "Leaving raw REPL".to_string(),
        _ => format!("Sending program ({} bytes)", text.len()),
    }
}

fn emit(out: &mut dyn Write, text: Option<String>) -> Result<()> {
    if let Some(text) = text {
        out.write_all(text.as_bytes())
            .and_then(|_| out.flush())
            .context("failed to write program output")?;
    }
    Ok(())
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

/// Poll a serial transport until the capture completes or stops.
fn capture_serial(
    transport: &mut dyn Transport,
    capture: &mut Capture,
    deadline: Option<Instant>,
    cancel: &AtomicBool,
    out: &mut dyn Write,
) -> Result<CaptureOutcome> {
    loop {
        if capture.is_done() {
            return Ok(CaptureOutcome::Completed);
        }
        if cancel.load(Ordering::SeqCst) {
            return Ok(CaptureOutcome::Interrupted);
        }
        if expired(deadline) {
            return Ok(CaptureOutcome::TimedOut);
        }

        match transport.read_nonblock(READ_CHUNK) {
            Ok(data) if data.is_empty() => thread::sleep(POLL_INTERVAL),
            Ok(data) => {
                debug!(
                    bytes = data.len(),
                    total = capture.bytes() + data.len(),
                    reads = capture.chunks() + 1,
                    "serial read"
                );
                trace!(data = ?data, "raw serial data");
                emit(out, capture.feed(&data))?;
            }
            Err(err @ (TransportError::UnsupportedOperation { .. } | TransportError::Closed)) => {
                return Err(err.into());
            }
            Err(err) => {
                warn!(error = %err, "serial read failed, retrying");
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

/// Feed WebSocket frames, forwarded over a channel from the delivery thread.
fn capture_websocket(
    transport: &mut dyn Transport,
    capture: &mut Capture,
    deadline: Option<Instant>,
    cancel: &AtomicBool,
    out: &mut dyn Write,
) -> Result<CaptureOutcome> {
    let (frames_tx, frames_rx) = mpsc::channel::<String>();
    transport.on_message(Box::new(move |frame| {
        let _ = frames_tx.send(frame);
    }))?;

    loop {
        if capture.is_done() {
            return Ok(CaptureOutcome::Completed);
        }
        if cancel.load(Ordering::SeqCst) {
            return Ok(CaptureOutcome::Interrupted);
        }
        if expired(deadline) {
            return Ok(CaptureOutcome::TimedOut);
        }

        match frames_rx.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => {
                debug!(
                    bytes = frame.len(),
                    total = capture.bytes() + frame.len(),
                    messages = capture.chunks() + 1,
                    "WebSocket message"
                );
                trace!(data = ?frame, "raw WebSocket data");
                emit(out, capture.feed(&frame))?;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(CaptureOutcome::Disconnected),
        }
    }
}

/// Capture the program's output from `transport` and write it to `out`.
///
/// The deadline only applies to this call.
pub fn capture_output(
    transport: &mut dyn Transport,
    timeout: Option<Duration>,
    cancel: &AtomicBool,
    out: &mut dyn Write,
) -> Result<CaptureOutcome> {
    let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
    let mut capture = Capture::new();
    debug!(?timeout, kind = %transport.kind(), "listening for output");

    let outcome = match transport.kind() {
        TransportKind::Serial => capture_serial(transport, &mut capture, deadline, cancel, out)?,
        TransportKind::WebSocket => {
            capture_websocket(transport, &mut capture, deadline, cancel, out)?
        }
    };

    if outcome != CaptureOutcome::Completed {
        emit(out, capture.finish())?;
    }
    debug!(
        ?outcome,
        bytes = capture.bytes(),
        chunks = capture.chunks(),
        "output monitoring complete"
    );
    Ok(outcome)
}

/// Wait out the double exit delay, then send one more Ctrl-D.
///
/// Ctrl-C cuts the wait short; the Ctrl-D is still sent.
fn double_exit(
    transport: &mut dyn Transport,
    options: &SessionOptions,
    cancel: &AtomicBool,
) -> Result<(), TransportError> {
    debug!("double exit: waiting {:?} before sending Ctrl-D", DOUBLE_EXIT_DELAY);
    let mut waited = Duration::ZERO;
    while waited < DOUBLE_EXIT_DELAY {
        if cancel.load(Ordering::SeqCst) {
            debug!(?waited, "double exit wait interrupted");
            break;
        }
        (options.pause)(POLL_INTERVAL);
        waited += POLL_INTERVAL;
    }
    transport.write(CTRL_D)?;
    transport.flush()?;
    debug!("double exit sequence complete");
    Ok(())
}

/// Send `program`, capture its output and close the transport.
///
/// The transport is closed exactly once on every path.
pub fn run(
    transport: &mut dyn Transport,
    program: &str,
    options: &SessionOptions,
    cancel: &AtomicBool,
    out: &mut dyn Write,
    progress: &ProgressBar,
) -> Result<CaptureOutcome> {
    if let Err(err) = send_program(transport, program, options, progress) {
        progress.abandon();
        transport.close();
        return Err(err).context("error during CircuitPython communication");
    }

    let outcome = capture_output(transport, options.timeout, cancel, out);

    if options.double_exit {
        if let Err(err) = double_exit(transport, options, cancel) {
            warn!(error = %err, "double exit failed");
        }
    }

    debug!("closing {} connection", transport.kind());
    transport.close();
    outcome
}
