// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Transport errors and the single user-facing report printed on failure.

use std::fmt::Write as _;

use thiserror::Error;

use crate::transport::TransportKind;

/// Failures raised by a transport, from connection setup to teardown.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open serial port {port}: {source}")]
    OpenFailed {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Bad password - authentication failed")]
    BadCredentials,

    #[error("Connection refused")]
    ConnectionRefused,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// A serial-only or socket-only call reached the wrong transport.
    #[error("{operation} is not supported on {kind} transports")]
    UnsupportedOperation {
        operation: &'static str,
        kind: TransportKind,
    },

    #[error("transport is closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Http(ref response) if response.status().as_u16() == 401 => {
                TransportError::BadCredentials
            }
            tungstenite::Error::Io(io) => TransportError::from_connect_io(io),
            other => TransportError::WebSocket(other.to_string()),
        }
    }
}

impl TransportError {
    /// Classify an I/O error raised while connecting.
    pub fn from_connect_io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::ConnectionRefused => TransportError::ConnectionRefused,
            ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportError::ConnectionTimeout,
            _ => TransportError::Io(err),
        }
    }
}

/// Render the one message shown to the operator for a fatal error.
///
/// `device` is the connection string as typed, used in the suggested command lines.
pub fn report(err: &anyhow::Error, device: &str) -> String {
    let transport_err = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<TransportError>());

    let mut out = String::new();
    match transport_err {
        Some(TransportError::BadCredentials) => {
            let _ = writeln!(out, "Error: Bad password - authentication failed");
            let _ = writeln!(out, "Please check your password and try again.");
            let _ = writeln!(out, "Use the -p option to specify the correct password:");
            let _ = write!(out, "  circremote -p <password> {} <script>", device);
        }
        Some(TransportError::ConnectionRefused) => {
            let _ = writeln!(out, "Error: Connection refused");
            let _ = writeln!(out, "The connection was refused. This could be due to:");
            let _ = writeln!(out, "  - Incorrect IP address");
            let _ = writeln!(out, "  - Wrong port number");
            let _ = writeln!(out, "  - Device not running CircuitPython Web Workflow");
            let _ = writeln!(out, "  - Firewall blocking the connection");
            let _ = writeln!(out);
            let _ = writeln!(out, "To enable Web Workflow on your CircuitPython device:");
            let _ = writeln!(
                out,
                "  - See https://docs.circuitpython.org/en/latest/docs/workflow.html"
            );
            let _ = writeln!(
                out,
                "  - Add CIRCUITPY_WEB_API_PASSWORD = \"your_password\" to settings.toml"
            );
            let _ = writeln!(out, "  - Restart the device");
            let _ = writeln!(out);
            let _ = writeln!(out, "Check your connection string and try again:");
            let _ = write!(out, "  circremote {} <script>", device);
        }
        Some(TransportError::ConnectionTimeout) => {
            let _ = writeln!(out, "Error: Connection timeout");
            let _ = write!(
                out,
                "No answer from {} within 5 seconds. Is the device on the network?",
                device
            );
        }
        Some(TransportError::OpenFailed { port, source }) => {
            let _ = write!(out, "Error opening serial port {}: {}", port, source);
        }
        _ => {
            let _ = write!(out, "Error: {:#}", err);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_classified_errors_survive_context() {
        let err = Err::<(), _>(TransportError::ConnectionRefused)
            .context("connecting")
            .unwrap_err();
        let text = report(&err, "192.168.1.100");
        assert!(text.starts_with("Error: Connection refused"));
        assert!(text.contains("circremote 192.168.1.100 <script>"));
        assert!(!text.contains("connecting"));
    }

    #[test]
    fn test_bad_credentials_report_mentions_password_flag() {
        let err = anyhow::Error::new(TransportError::BadCredentials);
        let text = report(&err, "10.0.0.2:8080");
        assert!(text.contains("-p <password> 10.0.0.2:8080"));
        assert_eq!(text.matches("Bad password").count(), 1);
    }

    #[test]
    fn test_generic_report_includes_context_chain() {
        let err = Err::<(), _>(TransportError::Closed)
            .context("error during CircuitPython communication")
            .unwrap_err();
        assert_eq!(
            report(&err, "/dev/ttyACM0"),
            "Error: error during CircuitPython communication: transport is closed"
        );
    }

    #[test]
    fn test_connect_io_classification() {
        use std::io::{Error, ErrorKind};

        assert!(matches!(
            TransportError::from_connect_io(Error::from(ErrorKind::ConnectionRefused)),
            TransportError::ConnectionRefused
        ));
        assert!(matches!(
            TransportError::from_connect_io(Error::from(ErrorKind::TimedOut)),
            TransportError::ConnectionTimeout
        ));
        assert!(matches!(
            TransportError::from_connect_io(Error::from(ErrorKind::PermissionDenied)),
            TransportError::Io(_)
        ));
    }
}
