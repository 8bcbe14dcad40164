// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Connection target classification.
//!
//! A dotted-quad IPv4 address, optionally followed by `:port`, names a Web Workflow
//! console. Anything else, hostnames included, is a local serial device path.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::protocol::{WEBSOCKET_DEFAULT_PORT, WEBSOCKET_PATH, WEBSOCKET_TLS_PORT};

static IPV4_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3}\.){3}\d{1,3}(:\d+)?$").expect("static pattern is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("empty connection target")]
    Empty,
    #[error("invalid port '{port}' in '{target}'")]
    InvalidPort { target: String, port: String },
}

/// Where the session connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Serial device path, e.g. `/dev/ttyACM0` or `COM3`.
    Serial(String),
    /// Web Workflow console.
    WebSocket { host: String, port: u16 },
}

/// Web Workflow console URL for `host:port`; port 443 selects TLS.
pub fn console_url(host: &str, port: u16) -> String {
    let scheme = if port == WEBSOCKET_TLS_PORT { "wss" } else { "ws" };
    format!("{}://{}:{}{}", scheme, host, port, WEBSOCKET_PATH)
}

/// True when `input` looks like an IPv4 literal with an optional port.
pub fn is_websocket_target(input: &str) -> bool {
    IPV4_TARGET.is_match(input)
}

impl Target {
    /// Classify and parse a connection string.
    pub fn parse(input: &str) -> Result<Self, TargetError> {
        if input.is_empty() {
            return Err(TargetError::Empty);
        }
        if !is_websocket_target(input) {
            return Ok(Target::Serial(input.to_string()));
        }

        match input.split_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| TargetError::InvalidPort {
                    target: input.to_string(),
                    port: port.to_string(),
                })?;
                Ok(Target::WebSocket {
                    host: host.to_string(),
                    port,
                })
            }
            None => Ok(Target::WebSocket {
                host: input.to_string(),
                port: WEBSOCKET_DEFAULT_PORT,
            }),
        }
    }

    pub fn is_websocket(&self) -> bool {
        matches!(self, Target::WebSocket { .. })
    }

    /// Console URL for a WebSocket target, `None` for serial.
    pub fn websocket_url(&self) -> Option<String> {
        match self {
            Target::Serial(_) => None,
            Target::WebSocket { host, port } => Some(console_url(host, *port)),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Serial(path) => write!(f, "{}", path),
            Target::WebSocket { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}
