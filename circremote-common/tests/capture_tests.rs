// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for the output capture FSM.

use circremote_common::capture::{extract, partial_marker_len, Capture, CaptureState};
use circremote_common::protocol::{END_MARKER, START_MARKER};

fn feed_all(capture: &mut Capture, chunks: &[&str]) -> Vec<String> {
    chunks.iter().filter_map(|chunk| capture.feed(chunk)).collect()
}

// =============================================================================
// Single buffer
// =============================================================================

#[test]
fn test_single_buffer_extracts_between_markers() {
    let (out, state) = extract(["noise***START***AB***END***more"]);
    assert_eq!(out, "AB");
    assert_eq!(state, CaptureState::Done);
}

#[test]
fn test_single_buffer_emits_once() {
    let mut capture = Capture::new();
    let emitted = feed_all(&mut capture, &["noise***START***AB***END***more"]);
    assert_eq!(emitted, vec!["AB".to_string()]);
    assert!(capture.is_done());
    assert_eq!(capture.pending(), "");
}

#[test]
fn test_end_before_start_is_ignored() {
    let (out, state) = extract(["***END***junk***START***real***END***"]);
    assert_eq!(out, "real");
    assert_eq!(state, CaptureState::Done);
}

#[test]
fn test_inner_whitespace_preserved() {
    let (out, _) = extract(["***START***\r\n2\r\n***END***\r\n"]);
    assert_eq!(out, "\r\n2\r\n");
}

// =============================================================================
// Split across reads
// =============================================================================

#[test]
fn test_split_across_reads_matches_single_buffer() {
    let (split, split_state) = extract(["noise***STA", "RT***AB", "***END***tail"]);
    let (whole, whole_state) = extract(["noise***START***AB***END***tail"]);
    assert_eq!(split, "AB");
    assert_eq!(split, whole);
    assert_eq!(split_state, whole_state);
}

#[test]
fn test_every_split_point_yields_same_output() {
    let stream = "banner>>> ***START***line one\r\nline two***END***\r\n>>> ";
    let (expected, _) = extract([stream]);
    for cut in 1..stream.len() {
        let (head, tail) = stream.split_at(cut);
        let (out, state) = extract([head, tail]);
        assert_eq!(out, expected, "split at {}", cut);
        assert_eq!(state, CaptureState::Done, "split at {}", cut);
    }
}

#[test]
fn test_byte_by_byte_feed() {
    let stream = "xx***START***hello\r\n***END***yy";
    let chars: Vec<String> = stream.chars().map(|c| c.to_string()).collect();
    let (out, state) = extract(chars.iter().map(String::as_str));
    assert_eq!(out, "hello\r\n");
    assert_eq!(state, CaptureState::Done);
}

#[test]
fn test_end_marker_split_in_body() {
    let mut capture = Capture::new();
    let emitted = feed_all(&mut capture, &["***START***", "value***EN", "D***"]);
    assert_eq!(emitted, vec!["value".to_string()]);
    assert!(capture.is_done());
}

// =============================================================================
// Whitespace suppression
// =============================================================================

#[test]
fn test_whitespace_only_between_markers_not_emitted() {
    let mut capture = Capture::new();
    let emitted = feed_all(&mut capture, &["***START***\r\n  \r\n***END***"]);
    assert!(emitted.is_empty());
    assert!(capture.is_done());
}

#[test]
fn test_whitespace_only_text_before_end_not_emitted() {
    let mut capture = Capture::new();
    capture.feed("***START***");
    assert_eq!(capture.feed("  \r\n***END***"), None);
    assert!(capture.is_done());
}

#[test]
fn test_whitespace_after_start_is_consumed() {
    let mut capture = Capture::new();
    assert_eq!(capture.feed("***START***\r\n"), None);
    assert_eq!(capture.state(), CaptureState::InBody);
    assert_eq!(capture.feed("42\r\n"), Some("42\r\n".to_string()));
}


// =============================================================================
// Streaming passthrough
// =============================================================================

#[test]
fn test_body_chunks_emitted_immediately() {
    let mut capture = Capture::new();
    assert_eq!(capture.feed("noise***START***first\r\n"), Some("first\r\n".to_string()));
    assert_eq!(capture.feed("second\r\n"), Some("second\r\n".to_string()));
    assert_eq!(capture.feed("third\r\n"), Some("third\r\n".to_string()));
    assert_eq!(capture.state(), CaptureState::InBody);
    assert_eq!(capture.feed("***END***"), None);
    assert!(capture.is_done());
}

#[test]
fn test_whitespace_only_body_chunks_emitted_verbatim() {
    let mut capture = Capture::new();
    capture.feed("***START***");
    assert_eq!(capture.feed("a"), Some("a".to_string()));
    assert_eq!(capture.feed("\r\n"), Some("\r\n".to_string()));
    assert_eq!(capture.feed("\r\n  "), Some("\r\n  ".to_string()));
    assert_eq!(capture.feed("b"), Some("b".to_string()));
    assert_eq!(capture.state(), CaptureState::InBody);
}

#[test]
fn test_trailing_newline_before_split_end_is_emitted() {
    let (out, state) = extract(["***START***", "a", "\r\n", "***END***"]);
    assert_eq!(out, "a\r\n");
    assert_eq!(state, CaptureState::Done);

    let (out, _) = extract(["***START***", "2", "\r\n", "***EN", "D***\r\n>"]);
    assert_eq!(out, "2\r\n");
}

#[test]
fn test_pre_start_noise_never_emitted() {
    let mut capture = Capture::new();
    assert_eq!(capture.feed("Adafruit CircuitPython 9.0.0\r\n"), None);
    assert_eq!(capture.feed(">>> raw REPL; CTRL-B to exit\r\n>"), None);
    assert_eq!(capture.state(), CaptureState::AwaitingStart);
}

#[test]
fn test_noise_buffer_stays_bounded() {
    let mut capture = Capture::new();
    for _ in 0..1000 {
        capture.feed("lots of banner text without markers ");
    }
    assert!(capture.pending().len() < START_MARKER.len());
    assert_eq!(capture.bytes(), 1000 * 36);
    assert_eq!(capture.chunks(), 1000);
}

// =============================================================================
// Done state and early finish
// =============================================================================

#[test]
fn test_feed_after_done_is_ignored() {
    let mut capture = Capture::new();
    capture.feed("***START***x***END***");
    assert!(capture.is_done());
    assert_eq!(capture.feed("***START***again***END***"), None);
    assert_eq!(capture.chunks(), 1);
}

#[test]
fn test_finish_flushes_held_back_body() {
    let mut capture = Capture::new();
    assert_eq!(capture.feed("***START***rating: **"), Some("rating: ".to_string()));
    assert_eq!(capture.finish(), Some("**".to_string()));
    assert!(capture.is_done());
}

#[test]
fn test_finish_before_start_emits_nothing() {
    let mut capture = Capture::new();
    capture.feed("banner ***STA");
    assert_eq!(capture.finish(), None);
    assert!(capture.is_done());
}

#[test]
fn test_empty_chunk_is_not_counted() {
    let mut capture = Capture::new();
    assert_eq!(capture.feed(""), None);
    assert_eq!(capture.chunks(), 0);
}

// =============================================================================
// partial_marker_len
// =============================================================================

#[test]
fn test_partial_marker_len() {
    assert_eq!(partial_marker_len("abc", END_MARKER), 0);
    assert_eq!(partial_marker_len("abc*", END_MARKER), 1);
    assert_eq!(partial_marker_len("abc***E", END_MARKER), 4);
    assert_eq!(partial_marker_len("abc***END**", END_MARKER), 8);
}
