// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Serial transport (USB CDC console).

use std::io::{ErrorKind, Read, Write};

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use circremote_common::protocol::{SERIAL_BAUD_RATE, SERIAL_READ_TIMEOUT};

use super::{Transport, TransportKind};
use crate::error::TransportError;

/// Serial console opened at 115200 8N1.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    name: String,
    // Trailing bytes of a UTF-8 sequence cut by the previous read.
    partial: Vec<u8>,
}

impl SerialTransport {
    /// Open `path` with a short read timeout so polling never stalls for long.
    pub fn open(path: &str) -> Result<Self, TransportError> {
        debug!(port = path, "opening serial port at {} bps, 8N1", SERIAL_BAUD_RATE);

        let port = serialport::new(path, SERIAL_BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(SERIAL_READ_TIMEOUT)
            .open()
            .map_err(|source| TransportError::OpenFailed {
                port: path.to_string(),
                source,
            })?;

        debug!(port = path, "serial port opened");
        Ok(Self::from_port(port, path))
    }

    /// Wrap an already opened port.
    pub fn from_port(port: Box<dyn SerialPort>, name: &str) -> Self {
        Self {
            port: Some(port),
            name: name.to_string(),
            partial: Vec::new(),
        }
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

/// Decode `bytes` after any carried-over prefix, keeping an incomplete trailing
/// sequence for the next call. Invalid sequences become U+FFFD.
pub fn decode_lossy(partial: &mut Vec<u8>, bytes: &[u8]) -> String {
    partial.extend_from_slice(bytes);
    let keep = match std::str::from_utf8(partial) {
        Ok(_) => 0,
        // error_len() is None only when the input ends mid-sequence.
        Err(e) if e.error_len().is_none() => partial.len() - e.valid_up_to(),
        Err(_) => 0,
    };
    let tail = partial.split_off(partial.len() - keep);
    let text = String::from_utf8_lossy(partial).into_owned();
    *partial = tail;
    text
}

impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn write(&mut self, text: &str) -> Result<(), TransportError> {
        debug!("writing {} bytes", text.len());
        self.port()?.write_all(text.as_bytes())?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.port()?.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(port = %self.name, "serial port closed");
        }
    }

    fn read_nonblock(&mut self, max_bytes: usize) -> Result<String, TransportError> {
        let port = self.port()?;
        // Fall back to a timed read where the driver cannot report queued bytes.
        let wanted = match port.bytes_to_read() {
            Ok(0) => return Ok(String::new()),
            Ok(available) => (available as usize).min(max_bytes),
            Err(_) => max_bytes,
        };

        let mut buf = vec![0u8; wanted];
        let n = match port.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::TimedOut => 0,
            Err(e) => return Err(e.into()),
        };
        Ok(decode_lossy(&mut self.partial, &buf[..n]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_ascii() {
        let mut partial = Vec::new();
        assert_eq!(decode_lossy(&mut partial, b"hello"), "hello");
        assert!(partial.is_empty());
    }

    #[test]
    fn test_decode_joins_split_sequence() {
        let mut partial = Vec::new();
        assert_eq!(decode_lossy(&mut partial, &[b'a', 0xC3]), "a");
        assert_eq!(partial, vec![0xC3]);
        assert_eq!(decode_lossy(&mut partial, &[0xA9, b'b']), "\u{e9}b");
        assert!(partial.is_empty());
    }

    #[test]
    fn test_decode_replaces_invalid_bytes() {
        let mut partial = Vec::new();
        assert_eq!(decode_lossy(&mut partial, &[b'x', 0xFF, b'y']), "x\u{fffd}y");
        assert!(partial.is_empty());
    }

    #[test]
    fn test_open_missing_device_fails() {
        let err = SerialTransport::open("/dev/does-not-exist-circremote")
            .err()
            .expect("opening a missing device must fail");
        assert!(matches!(err, TransportError::OpenFailed { .. }));
    }

    #[cfg(unix)]
    mod pty {
        use std::io::Write;
        use std::time::{Duration, Instant};

        use serialport::TTYPort;

        use super::super::*;

        fn pair() -> (SerialTransport, TTYPort) {
            let (master, slave) = TTYPort::pair().expect("pseudo terminal pair");
            (SerialTransport::from_port(Box::new(master), "pty"), slave)
        }

        #[test]
        fn test_on_message_is_unsupported() {
            let (mut transport, _slave) = pair();
            let err = transport.on_message(Box::new(|_| {})).unwrap_err();
            assert!(matches!(
                err,
                TransportError::UnsupportedOperation {
                    operation: "on_message",
                    kind: TransportKind::Serial
                }
            ));
        }

        #[test]
        fn test_close_is_idempotent() {
            let (mut transport, _slave) = pair();
            transport.close();
            transport.close();
            assert!(matches!(transport.write("x"), Err(TransportError::Closed)));
            assert!(matches!(
                transport.read_nonblock(16),
                Err(TransportError::Closed)
            ));
        }

        #[test]
        fn test_read_nonblock_returns_available_text() {
            let (mut transport, mut slave) = pair();
            assert_eq!(transport.read_nonblock(1024).unwrap(), "");

            slave.write_all(b"abc").unwrap();
            slave.flush().unwrap();

            let deadline = Instant::now() + Duration::from_secs(2);
            let mut text = String::new();
            while text.len() < 3 && Instant::now() < deadline {
                text.push_str(&transport.read_nonblock(1024).unwrap());
                std::thread::sleep(Duration::from_millis(10));
            }
            assert_eq!(text, "abc");
        }
    }
}
