// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Common types and logic for circremote.
//!
//! Everything here is transport-independent and free of I/O:
//! - `protocol`: raw REPL control bytes, sentinels, timings and the handshake sequence
//! - `target`: classification of a connection string as serial or Web Workflow
//! - `capture`: the sentinel-driven output capture state machine

pub mod capture;
pub mod protocol;
pub mod target;

// Re-export commonly used types
pub use capture::{Capture, CaptureState};
pub use protocol::{Step, END_MARKER, START_MARKER};
pub use target::{Target, TargetError};
