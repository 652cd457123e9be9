//! Transcript to command mapping
//!
//! Plain keyword matching over the lower-cased transcript; the first matching
//! keyword group wins, wherever it appears ("uh call mom please",
//! "what's the time").

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Keywords that start a call, checked in this order
const CALL_KEYWORDS: [&str; 3] = ["call", "dial", "phone"];

/// Minimum digit count for a spoken number to be dialled directly
pub const MIN_DIRECT_NUMBER_DIGITS: usize = 10;

static NON_DIGIT_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9]").unwrap());

/// What the session is listening for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Free command after a gesture
    Command,
    /// Answer/reject reply to a ringing call
    IncomingCall,
}

/// Who to call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CallTarget {
    /// Digits to dial as-is
    Number(String),
    /// Name to look up in the contact directory
    Contact(String),
    /// A call keyword with nothing after it
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "target", rename_all = "snake_case")]
pub enum Command {
    PlaceCall(CallTarget),
    QueryTime,
    QueryBattery,
    MediaNext,
    MediaPlay,
    MediaPause,
    AnswerCall,
    RejectCall,
    Unknown,
}

impl Command {
    /// Short label for logs
    pub fn description(&self) -> &'static str {
        match self {
            Command::PlaceCall(_) => "Place call",
            Command::QueryTime => "Query time",
            Command::QueryBattery => "Query battery",
            Command::MediaNext => "Next track",
            Command::MediaPlay => "Play",
            Command::MediaPause => "Pause",
            Command::AnswerCall => "Answer call",
            Command::RejectCall => "Reject call",
            Command::Unknown => "Unknown",
        }
    }
}

/// Map a transcript to a command for the given session mode
pub fn interpret(transcript: &str, mode: SessionMode) -> Command {
    let text = transcript.trim().to_lowercase();

    match mode {
        SessionMode::IncomingCall => interpret_call_reply(&text),
        SessionMode::Command => interpret_command(&text),
    }
}

fn interpret_call_reply(text: &str) -> Command {
    if text.contains("answer") {
        Command::AnswerCall
    } else if text.contains("reject") {
        Command::RejectCall
    } else {
        Command::Unknown
    }
}

fn interpret_command(text: &str) -> Command {
    if let Some(target) = call_target(text) {
        return Command::PlaceCall(target);
    }

    let has = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

    if has(&["time"]) {
        Command::QueryTime
    } else if has(&["battery"]) {
        Command::QueryBattery
    } else if has(&["next", "skip"]) {
        Command::MediaNext
    } else if has(&["play", "resume"]) {
        Command::MediaPlay
    } else if has(&["pause", "stop"]) {
        Command::MediaPause
    } else {
        Command::Unknown
    }
}

/// Text after the first call keyword, if the transcript contains one
fn call_target(text: &str) -> Option<CallTarget> {
    let (keyword, index) = CALL_KEYWORDS
        .iter()
        .find_map(|k| text.find(k).map(|i| (*k, i)))?;

    let query = text[index + keyword.len()..].trim();
    if query.is_empty() {
        return Some(CallTarget::Unspecified);
    }

    let digits = NON_DIGIT_PATTERN.replace_all(query, "");
    if digits.len() >= MIN_DIRECT_NUMBER_DIGITS {
        Some(CallTarget::Number(digits.into_owned()))
    } else {
        Some(CallTarget::Contact(query.to_string()))
    }
}
