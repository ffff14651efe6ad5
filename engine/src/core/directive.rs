//! Directive parsing for raw agent output.
//!
//! Agent replies are free text. The only accepted wire shapes are a line
//! `Action: <call>` / `Action: finish()` or a quiz line `Answer: <letter>`,
//! optionally wrapped in a single `<action>…</action>` tag pair. Parsing is
//! total: every input yields exactly one [`ParsedDirective`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const ACTION_MARKER: &str = "Action:";
const ANSWER_MARKER: &str = "Answer:";
const ANSWER_CHOICES: &str = "ABCDE";

static WRAPPER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<action>(.*?)</action>").unwrap());
static STRAY_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?action>").unwrap());

/// Why the agent ended the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Normal,
    QuizAnswer,
}

/// One parsed unit of agent output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum ParsedDirective {
    /// `content` is the undecoded action-call text.
    Execute { content: String },
    /// Quiz answers always carry `Some("Answer: X")`.
    Finish {
        content: Option<String>,
        reason: FinishReason,
    },
    Invalid { raw_text: String },
}

/// Parse raw agent output into a directive.
pub fn parse_directive(raw_text: &str) -> ParsedDirective {
    let body = unwrap_action_tags(raw_text);

    if let Some(call) = find_action_line(&body) {
        if is_finish_call(call) {
            return ParsedDirective::Finish {
                content: None,
                reason: FinishReason::Normal,
            };
        }
        return ParsedDirective::Execute {
            content: call.to_string(),
        };
    }

    if let Some(answer) = find_answer_line(&body) {
        return ParsedDirective::Finish {
            content: Some(answer),
            reason: FinishReason::QuizAnswer,
        };
    }

    ParsedDirective::Invalid {
        raw_text: raw_text.to_string(),
    }
}

/// Return the text inside the first well-formed `<action>` pair.
///
/// A damaged pair (opening without closing or the reverse) falls back to the
/// whole text with the stray tags removed.
fn unwrap_action_tags(raw_text: &str) -> String {
    if let Some(inner) = WRAPPER_RE.captures(raw_text).and_then(|caps| caps.get(1)) {
        return inner.as_str().to_string();
    }
    STRAY_TAG_RE.replace_all(raw_text, "").into_owned()
}

fn find_action_line(body: &str) -> Option<&str> {
    body.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix(ACTION_MARKER)?.trim();
        (!rest.is_empty()).then_some(rest)
    })
}

fn find_answer_line(body: &str) -> Option<String> {
    body.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix(ANSWER_MARKER)?.trim();
        let mut chars = rest.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        if chars.next().is_some() || !ANSWER_CHOICES.contains(letter) {
            return None;
        }
        Some(format!("{ANSWER_MARKER} {letter}"))
    })
}

fn is_finish_call(call: &str) -> bool {
    let compact: String = call.chars().filter(|ch| !ch.is_whitespace()).collect();
    compact.eq_ignore_ascii_case("finish()")
}
