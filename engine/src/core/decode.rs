//! Decoding of action-call text into an operation name and typed arguments.
//!
//! Call shape: `subsystem.method(name=value, ...)`. Values may be quoted
//! strings, booleans, numbers, bare identifiers, or JSON literals in `{}` /
//! `[]`. Quoted values routinely contain parentheses (section ids such as
//! `GFJ003111100(2)`), so the call body ends at the *last* `)` and argument
//! separators are only recognised outside quotes and brackets.

use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Serialize, Serializer};
use thiserror::Error;

static OPERATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_]+\.[a-z_]+$").unwrap());
static ARG_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
static INTEGER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[+-]?\d+$").unwrap());
static FLOAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+\.\d*|\.\d+|\d+)([eE][+-]?\d+)?$").unwrap());

/// A decoded argument value.
///
/// Numeric variants keep the literal as written in `raw`, so identifiers
/// such as `00042` survive being bound to a text parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Quoted string, escapes already resolved.
    Str(String),
    Bool(bool),
    Int { value: i64, raw: String },
    /// Float literal, or an integer literal outside the `i64` range.
    Float { value: f64, raw: String },
    /// Unquoted token that is neither boolean nor numeric.
    Ident(String),
    /// Bracketed `{...}` or `[...]` literal.
    Json(serde_json::Value),
}

impl Value {
    /// Textual form used when a scalar is bound to a text parameter.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Str(text) | Value::Ident(text) => Some(text.clone()),
            Value::Int { raw, .. } | Value::Float { raw, .. } => Some(raw.clone()),
            Value::Bool(_) | Value::Json(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Int { .. } => "integer",
            Value::Float { .. } => "number",
            Value::Ident(_) => "identifier",
            Value::Json(_) => "object",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(text) => write!(f, "{text:?}"),
            Value::Bool(flag) => write!(f, "{}", if *flag { "True" } else { "False" }),
            Value::Int { raw, .. } | Value::Float { raw, .. } => f.write_str(raw),
            Value::Ident(text) => f.write_str(text),
            Value::Json(json) => write!(f, "{json}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Str(text) | Value::Ident(text) => serializer.serialize_str(text),
            Value::Bool(flag) => serializer.serialize_bool(*flag),
            Value::Int { value, .. } => serializer.serialize_i64(*value),
            Value::Float { value, .. } => serializer.serialize_f64(*value),
            Value::Json(json) => json.serialize(serializer),
        }
    }
}

/// Decoded operation call with arguments in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionCall {
    pub operation: String,
    pub args: IndexMap<String, Value>,
}

impl ActionCall {
    /// Text before the first `.` of the operation name.
    pub fn subsystem(&self) -> &str {
        self.operation
            .split_once('.')
            .map_or(self.operation.as_str(), |(subsystem, _)| subsystem)
    }

    /// Text after the first `.` of the operation name.
    pub fn method(&self) -> &str {
        self.operation
            .split_once('.')
            .map_or("", |(_, method)| method)
    }
}

/// Syntactic problems in action-call text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing '(' after operation name in `{0}`")]
    MissingOpenParen(String),
    #[error("missing closing ')' in `{0}`")]
    MissingCloseParen(String),
    #[error("unexpected text after closing ')': `{0}`")]
    TrailingText(String),
    #[error("operation name `{0}` must look like `subsystem.method`")]
    InvalidOperationName(String),
    #[error("unterminated quoted value starting at byte {0}")]
    UnterminatedQuote(usize),
    #[error("unbalanced `{0}` in arguments")]
    UnbalancedDelimiter(char),
    #[error("empty argument at position {0}")]
    EmptyArgument(usize),
    #[error("argument `{0}` must be written as name=value")]
    PositionalArgument(String),
    #[error("invalid argument name `{0}`")]
    InvalidArgumentName(String),
    #[error("argument `{0}` has no value")]
    MissingValue(String),
    #[error("argument `{0}` is given more than once")]
    DuplicateArgument(String),
    #[error("argument `{name}` has unexpected text after its quoted value: `{rest}`")]
    TextAfterQuote { name: String, rest: String },
    #[error("argument `{name}` has an unquoted value `{value}` that must be quoted")]
    UnquotedValue { name: String, value: String },
    #[error("argument `{name}` is not a valid literal: {reason}")]
    InvalidLiteral { name: String, reason: String },
}

/// Decode an action call such as `draft.add_course(section_id="GFJ003111100(2)")`.
pub fn decode_action_call(action_call_text: &str) -> Result<ActionCall, DecodeError> {
    let text = action_call_text.trim();
    let open = text
        .find('(')
        .ok_or_else(|| DecodeError::MissingOpenParen(text.to_string()))?;
    let close = text
        .rfind(')')
        .filter(|close| *close > open)
        .ok_or_else(|| DecodeError::MissingCloseParen(text.to_string()))?;

    let trailing = text[close + 1..].trim();
    if !trailing.is_empty() {
        return Err(DecodeError::TrailingText(trailing.to_string()));
    }

    let operation = text[..open].trim();
    if !OPERATION_RE.is_match(operation) {
        return Err(DecodeError::InvalidOperationName(operation.to_string()));
    }

    let args = decode_arguments(&text[open + 1..close])?;
    Ok(ActionCall {
        operation: operation.to_string(),
        args,
    })
}

fn decode_arguments(body: &str) -> Result<IndexMap<String, Value>, DecodeError> {
    let mut args = IndexMap::new();
    if body.trim().is_empty() {
        return Ok(args);
    }

    let segments = split_top_level(body)?;
    let last = segments.len() - 1;
    for (index, segment) in segments.iter().enumerate() {
        let segment = segment.trim();
        if segment.is_empty() {
            // One trailing comma is tolerated: `f(a=1,)`.
            if index == last && index > 0 {
                continue;
            }
            return Err(DecodeError::EmptyArgument(index));
        }

        let (name, raw_value) = segment
            .split_once('=')
            .ok_or_else(|| DecodeError::PositionalArgument(segment.to_string()))?;
        let name = name.trim();
        if !ARG_NAME_RE.is_match(name) {
            return Err(DecodeError::InvalidArgumentName(name.to_string()));
        }
        let value = decode_value(name, raw_value.trim())?;
        if args.contains_key(name) {
            return Err(DecodeError::DuplicateArgument(name.to_string()));
        }
        args.insert(name.to_string(), value);
    }
    Ok(args)
}

/// Split at commas that sit outside quotes and brackets.
fn split_top_level(body: &str) -> Result<Vec<&str>, DecodeError> {
    let mut segments = Vec::new();
    let mut stack: Vec<char> = Vec::new();
    let mut quote: Option<(char, usize)> = None;
    let mut escaped = false;
    let mut start = 0;

    for (pos, ch) in body.char_indices() {
        if let Some((delim, _)) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == delim {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some((ch, pos)),
            '(' | '[' | '{' => stack.push(ch),
            ')' | ']' | '}' => {
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return Err(DecodeError::UnbalancedDelimiter(ch));
                }
            }
            ',' if stack.is_empty() => {
                segments.push(&body[start..pos]);
                start = pos + 1;
            }
            _ => {}
        }
    }

    if let Some((_, pos)) = quote {
        return Err(DecodeError::UnterminatedQuote(pos));
    }
    if let Some(open) = stack.pop() {
        return Err(DecodeError::UnbalancedDelimiter(open));
    }
    segments.push(&body[start..]);
    Ok(segments)
}

fn decode_value(name: &str, raw: &str) -> Result<Value, DecodeError> {
    let Some(first) = raw.chars().next() else {
        return Err(DecodeError::MissingValue(name.to_string()));
    };
    match first {
        '"' | '\'' => decode_quoted(name, raw, first),
        '{' | '[' => serde_json::from_str(raw)
            .map(Value::Json)
            .map_err(|err| DecodeError::InvalidLiteral {
                name: name.to_string(),
                reason: err.to_string(),
            }),
        _ => decode_bare(name, raw),
    }
}

fn decode_quoted(name: &str, raw: &str, delim: char) -> Result<Value, DecodeError> {
    let mut escaped = false;
    for (pos, ch) in raw.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == delim {
            let rest = raw[pos + ch.len_utf8()..].trim();
            if !rest.is_empty() {
                return Err(DecodeError::TextAfterQuote {
                    name: name.to_string(),
                    rest: rest.to_string(),
                });
            }
            return Ok(Value::Str(unescape(&raw[delim.len_utf8()..pos])));
        }
    }
    Err(DecodeError::UnterminatedQuote(0))
}

/// Resolve backslash escapes in a single left-to-right pass.
///
/// Unknown escapes are kept verbatim, backslash included.
fn unescape(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(escaped @ ('\\' | '"' | '\'')) => out.push(escaped),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn decode_bare(name: &str, raw: &str) -> Result<Value, DecodeError> {
    if raw.eq_ignore_ascii_case("true") {
        return Ok(Value::Bool(true));
    }
    if raw.eq_ignore_ascii_case("false") {
        return Ok(Value::Bool(false));
    }
    if INTEGER_RE.is_match(raw)
        && let Ok(value) = raw.parse::<i64>()
    {
        return Ok(Value::Int {
            value,
            raw: raw.to_string(),
        });
    }
    if FLOAT_RE.is_match(raw)
        && let Ok(value) = raw.parse::<f64>()
    {
        return Ok(Value::Float {
            value,
            raw: raw.to_string(),
        });
    }
    let needs_quotes = raw
        .chars()
        .any(|ch| ch.is_whitespace() || "()[]{}\"'=,".contains(ch));
    if needs_quotes {
        return Err(DecodeError::UnquotedValue {
            name: name.to_string(),
            value: raw.to_string(),
        });
    }
    Ok(Value::Ident(raw.to_string()))
}
