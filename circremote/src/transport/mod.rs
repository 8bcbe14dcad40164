// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Transport layer for REPL communication.
//!
//! A serial port is a byte stream polled by the caller; a Web Workflow console is a
//! message stream pushed from a background thread. Both sit behind [`Transport`] so the
//! session driver can run one handshake and one capture state machine over either.

pub mod serial;
pub mod websocket;

use std::fmt;

use circremote_common::Target;

use crate::error::TransportError;

pub use serial::SerialTransport;
pub use websocket::WebSocketTransport;

/// Callback receiving one inbound WebSocket frame, in arrival order.
pub type MessageHandler = Box<dyn FnMut(String) + Send + 'static>;

/// Which kind of channel a transport is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Serial,
    WebSocket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Serial => write!(f, "serial"),
            TransportKind::WebSocket => write!(f, "WebSocket"),
        }
    }
}

/// A connection to a device REPL.
///
/// `read_nonblock` is only meaningful for serial transports and `on_message` only for
/// WebSocket transports; the other kind answers with
/// [`TransportError::UnsupportedOperation`].
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Encode `text` and transmit it. No chunking is applied.
    fn write(&mut self, text: &str) -> Result<(), TransportError>;

    /// Push buffered bytes out.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Release the underlying resource. Calling it again does nothing.
    fn close(&mut self);

    /// Return whatever text is available right now, possibly empty.
    fn read_nonblock(&mut self, _max_bytes: usize) -> Result<String, TransportError> {
        Err(TransportError::UnsupportedOperation {
            operation: "read_nonblock",
            kind: self.kind(),
        })
    }

    /// Register the callback invoked for each inbound frame.
    fn on_message(&mut self, _handler: MessageHandler) -> Result<(), TransportError> {
        Err(TransportError::UnsupportedOperation {
            operation: "on_message",
            kind: self.kind(),
        })
    }
}

/// Open the transport matching `target`.
///
/// `password` is only used for Web Workflow targets.
pub fn open(target: &Target, password: Option<&str>) -> Result<Box<dyn Transport>, TransportError> {
    match target {
        Target::Serial(path) => Ok(Box::new(SerialTransport::open(path)?)),
        Target::WebSocket { host, port } => Ok(Box::new(WebSocketTransport::connect(
            host, *port, password,
        )?)),
    }
}
