// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;

fn write_transcript(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

#[test]
fn accumulates_usage_across_assistant_records() {
    let file = write_transcript(&[
        r#"{"type":"user","message":{"content":"please fix the login flow"}}"#,
        r#"{"type":"assistant","message":{"usage":{"input_tokens":100,"output_tokens":20,"cache_read_input_tokens":5,"cache_creation_input_tokens":2}},"costUSD":0.01}"#,
        r#"{"type":"assistant","message":{"usage":{"input_tokens":50,"output_tokens":10}}}"#,
    ]);

    let summary = parse_transcript(file.path()).unwrap();
    assert_eq!(summary.usage.input_tokens, 150);
    assert_eq!(summary.usage.output_tokens, 30);
    assert_eq!(summary.usage.cache_read_tokens, 5);
    assert_eq!(summary.usage.cache_create_tokens, 2);
    assert!((summary.usage.cost_usd - 0.01).abs() < 1e-9);
    assert_eq!(summary.assistant_turns, 2);
}

#[test]
fn first_user_message_is_captured_and_capped() {
    let long = "x".repeat(600);
    let line = format!(r#"{{"type":"user","message":{{"content":"{long}"}}}}"#);
    let file = write_transcript(&[
        &line,
        r#"{"type":"user","message":{"content":"second message"}}"#,
    ]);

    let summary = parse_transcript(file.path()).unwrap();
    let first = summary.first_user_message.unwrap();
    assert_eq!(first.len(), 500);
    assert!(first.starts_with("xxx"));
}

#[test]
fn content_block_arrays_are_joined() {
    let file = write_transcript(&[
        r#"{"type":"user","message":{"content":[{"type":"text","text":"part one"},{"type":"image"},{"type":"text","text":"part two"}]}}"#,
    ]);
    let summary = parse_transcript(file.path()).unwrap();
    assert_eq!(summary.first_user_message.as_deref(), Some("part one\npart two"));
}

#[test]
fn garbage_lines_are_skipped() {
    let file = write_transcript(&[
        "not json at all",
        r#"{"type":"assistant","message":{"usage":{"input_tokens":7,"output_tokens":3}}}"#,
        "{truncated",
    ]);
    let summary = parse_transcript(file.path()).unwrap();
    assert_eq!(summary.usage.input_tokens, 7);
}

#[test]
fn missing_file_is_external_error() {
    let err = parse_transcript(Path::new("/nonexistent/t.jsonl")).unwrap_err();
    assert_eq!(err.kind(), "external");

    let err = parse_transcript_with_retry(Path::new("/nonexistent/t.jsonl")).unwrap_err();
    assert_eq!(err.kind(), "external");
}

#[test]
fn empty_transcript_is_zeroes() {
    let file = write_transcript(&[]);
    let summary = parse_transcript(file.path()).unwrap();
    assert!(summary.usage.is_zero());
    assert!(summary.first_user_message.is_none());
}
