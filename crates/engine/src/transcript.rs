// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assistant transcript parsing.
//!
//! Transcripts are JSONL: one record per line, `type: "assistant"` records
//! carry `message.usage` token counts, `type: "user"` records carry the
//! prompt. Lines that fail to parse are skipped; the runtime appends while
//! we read, so tolerance beats strictness here.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use pal_core::{Error, Result, UsageDelta};
use serde_json::Value;

/// How many characters of the first user message to keep.
const FIRST_MESSAGE_CAP: usize = 500;

/// Retry schedule for session_end parsing: the runtime may still be
/// flushing the file when the hook fires.
const PARSE_RETRIES: u32 = 3;
const PARSE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// What a transcript scan yields.
#[derive(Debug, Clone, Default)]
pub struct TranscriptSummary {
    pub usage: UsageDelta,
    pub first_user_message: Option<String>,
    pub assistant_turns: u32,
}

/// Scan a transcript once, accumulating usage across assistant records.
pub fn parse_transcript(path: &Path) -> Result<TranscriptSummary> {
    let file = File::open(path)
        .map_err(|e| Error::External(format!("open transcript {}: {e}", path.display())))?;
    let reader = BufReader::new(file);
    let mut summary = TranscriptSummary::default();

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<Value>(trimmed) else {
            continue;
        };
        match record.get("type").and_then(Value::as_str) {
            Some("assistant") => {
                summary.assistant_turns += 1;
                if let Some(usage) = record.pointer("/message/usage") {
                    summary.usage.input_tokens += int(usage, "input_tokens");
                    summary.usage.output_tokens += int(usage, "output_tokens");
                    summary.usage.cache_read_tokens += int(usage, "cache_read_input_tokens");
                    summary.usage.cache_create_tokens += int(usage, "cache_creation_input_tokens");
                }
                if let Some(cost) = record.get("costUSD").and_then(Value::as_f64) {
                    summary.usage.cost_usd += cost;
                }
            }
            Some("user") if summary.first_user_message.is_none() => {
                if let Some(text) = user_text(&record) {
                    summary.first_user_message = Some(truncate(&text, FIRST_MESSAGE_CAP));
                }
            }
            _ => {}
        }
    }
    Ok(summary)
}

/// Parse with the session_end retry schedule: three attempts, 100 ms apart.
/// Gives the runtime a moment to finish flushing before we give up.
pub fn parse_transcript_with_retry(path: &Path) -> Result<TranscriptSummary> {
    let mut last_err = None;
    for attempt in 0..PARSE_RETRIES {
        match parse_transcript(path) {
            Ok(summary) => return Ok(summary),
            Err(e) => {
                tracing::debug!(attempt, error = %e, "transcript parse failed");
                last_err = Some(e);
            }
        }
        if attempt + 1 < PARSE_RETRIES {
            std::thread::sleep(PARSE_RETRY_DELAY);
        }
    }
    Err(last_err.unwrap_or_else(|| Error::External("transcript unreadable".to_string())))
}

fn int(usage: &Value, key: &str) -> i64 {
    usage.get(key).and_then(Value::as_i64).unwrap_or(0)
}

/// Extract the text of a user record; content is either a plain string or a
/// list of content blocks.
fn user_text(record: &Value) -> Option<String> {
    let content = record.pointer("/message/content")?;
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(blocks) => {
            let text: Vec<&str> = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            if text.is_empty() {
                None
            } else {
                Some(text.join("\n"))
            }
        }
        _ => None,
    }
}

fn truncate(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}

#[cfg(test)]
#[path = "transcript_tests.rs"]
mod tests;
