// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Output capture FSM - pure logic without transport dependencies.
//!
//! The REPL stream interleaves firmware banners, prompts and echo with the program's
//! own output. The session wraps the program in two sentinel prints; this module
//! extracts the text between them. It is fed chunks in arrival order and returns the
//! text that should be shown to the operator, so every transport drives the same
//! machine and only the way chunks are sourced differs.

use crate::protocol::{END_MARKER, START_MARKER};

/// Capture progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    /// Discarding REPL noise until `***START***` shows up.
    AwaitingStart,
    /// Between the sentinels; output is streamed through.
    InBody,
    /// `***END***` seen. Terminal.
    Done,
}

/// Sentinel-delimited output extractor for a single program run.
#[derive(Debug)]
pub struct Capture {
    state: CaptureState,
    buffer: String,
    bytes: usize,
    chunks: usize,
}

impl Default for Capture {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `marker`.
///
/// Markers are ASCII, so the returned length always lands on a char boundary.
pub fn partial_marker_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&len| text.ends_with(&marker[..len]))
        .unwrap_or(0)
}

fn visible(segment: &str) -> Option<String> {
    if segment.trim().is_empty() {
        None
    } else {
        Some(segment.to_string())
    }
}

impl Capture {
    pub fn new() -> Self {
        Self {
            state: CaptureState::AwaitingStart,
            buffer: String::new(),
            bytes: 0,
            chunks: 0,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == CaptureState::Done
    }

    /// Bytes fed so far.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Non-empty chunks fed so far.
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Text currently held back, not yet emitted.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Feed one chunk and return the text to display, if any.
    ///
    /// Whitespace-only text right after `***START***` or right before `***END***` is
    /// consumed without being returned; other body text passes through. Chunks fed after
    /// the machine reached [`CaptureState::Done`] are ignored.
    pub fn feed(&mut self, chunk: &str) -> Option<String> {
        if chunk.is_empty() || self.is_done() {
            return None;
        }
        self.bytes += chunk.len();
        self.chunks += 1;
        self.buffer.push_str(chunk);

        match self.state {
            CaptureState::AwaitingStart => self.scan_for_start(),
            CaptureState::InBody => self.scan_body(),
            CaptureState::Done => None,
        }
    }

    /// End the capture early (timeout or interrupt), returning held-back body text.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let was_in_body = self.state == CaptureState::InBody;
        self.state = CaptureState::Done;
        if was_in_body {
            visible(&rest)
        } else {
            None
        }
    }

    fn scan_for_start(&mut self) -> Option<String> {
        let Some(start) = self.buffer.find(START_MARKER) else {
            // Only a partial start marker at the tail can still matter.
            let keep = partial_marker_len(&self.buffer, START_MARKER);
            let cut = self.buffer.len() - keep;
            self.buffer.drain(..cut);
            return None;
        };

        let body_start = start + START_MARKER.len();
        if let Some(offset) = self.buffer[body_start..].find(END_MARKER) {
            let segment = visible(&self.buffer[body_start..body_start + offset]);
            self.buffer.clear();
            self.state = CaptureState::Done;
            return segment;
        }

        let tail = self.buffer.split_off(body_start);
        self.buffer.clear();
        self.state = CaptureState::InBody;

        let keep = partial_marker_len(&tail, END_MARKER);
        let (shown, held) = tail.split_at(tail.len() - keep);
        self.buffer.push_str(held);
        visible(shown)
    }

    fn scan_body(&mut self) -> Option<String> {
        if let Some(end) = self.buffer.find(END_MARKER) {
            let segment = visible(&self.buffer[..end]);
            self.buffer.clear();
            self.state = CaptureState::Done;
            return segment;
        }

        // Everything except a possible partial end marker is passed through verbatim.
        let keep = partial_marker_len(&self.buffer, END_MARKER);
        let cut = self.buffer.len() - keep;
        if cut == 0 {
            return None;
        }
        Some(self.buffer.drain(..cut).collect())
    }
}

/// Run a complete chunk sequence through a fresh machine and join the emitted text.
pub fn extract<'a, I>(chunks: I) -> (String, CaptureState)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut capture = Capture::new();
    let mut out = String::new();
    for chunk in chunks {
        if let Some(text) = capture.feed(chunk) {
            out.push_str(&text);
        }
        if capture.is_done() {
            break;
        }
    }
    (out, capture.state())
}
