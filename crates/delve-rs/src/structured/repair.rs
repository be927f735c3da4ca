//! Recovery of JSON from free-text model responses.
//!
//! [`repair`] runs a fixed cascade of increasingly aggressive strategies and
//! stops at the first one that yields a JSON object or array:
//!
//! 1. parse the response as-is;
//! 2. unwrap a fenced code block;
//! 3. strip control characters and cut from the first `{` to the last `}`
//!    (or, failing that, from the first `[` to the last `]`);
//! 4. repair common syntax damage in that cut (quote styles, unescaped inner
//!    quotes, trailing commas, bare keys, raw newlines in strings);
//! 5. rebuild a flat object from `"key": value` pairs found anywhere in the
//!    text.
//!
//! Every strategy is pure and synchronous.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Which strategy recovered a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStage {
    /// The response was already valid JSON.
    Direct,
    /// Unwrapped from a fenced code block.
    Fenced,
    /// Cut out from surrounding prose.
    Extracted,
    /// Parsed after syntactic repair.
    Repaired,
    /// Rebuilt from scattered key/value pairs.
    Reconstructed,
    /// Nothing recoverable; synthesized from the schema.
    SchemaDefault,
    /// Nothing recoverable and no schema; an empty object.
    Empty,
}

impl RepairStage {
    /// Whether the value came from the fallback path rather than the model.
    pub fn is_fallback(self) -> bool {
        matches!(self, RepairStage::SchemaDefault | RepairStage::Empty)
    }
}

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```[A-Za-z0-9_-]*[ \t]*\r?\n?([\s\S]*?)\s*```").expect("fence pattern is valid")
});

static PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#""([^"\\]+)"\s*:\s*("(?:[^"\\]|\\.)*"|-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?|true|false|null|\[[^\[\]]*\])"#,
    )
    .expect("pair pattern is valid")
});

/// Run the recovery cascade over a raw model response.
///
/// Returns `None` when no strategy produced an object or array.
///
/// # Example
///
/// ```
/// use delve_rs::structured::repair::{repair, RepairStage};
///
/// let raw = "Sure! Here you go:\n```json\n{\"learnings\": [\"a\"]}\n```";
/// let (value, stage) = repair(raw).unwrap();
/// assert_eq!(stage, RepairStage::Fenced);
/// assert_eq!(value["learnings"][0], "a");
/// ```
pub fn repair(raw: &str) -> Option<(Value, RepairStage)> {
    if let Some(v) = parse_structured(raw) {
        return Some((v, RepairStage::Direct));
    }

    let mut working = raw;
    if let Some(inner) = FENCE.captures(raw).and_then(|c| c.get(1)) {
        working = inner.as_str();
        if let Some(v) = parse_structured(working) {
            return Some((v, RepairStage::Fenced));
        }
    }

    let cleaned = strip_control(working);
    // Objects first: a bracketed citation before the payload must not win.
    for (open, close) in [('{', '}'), ('[', ']')] {
        let Some(span) = delimited_span(&cleaned, open, close) else {
            continue;
        };
        if let Some(v) = parse_structured(span) {
            return Some((v, RepairStage::Extracted));
        }
        if let Some(v) = parse_structured(&repair_syntax(span)) {
            return Some((v, RepairStage::Repaired));
        }
    }

    reconstruct(raw).map(|v| (v, RepairStage::Reconstructed))
}

/// Parse text that must be a JSON object or array.
fn parse_structured(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(v @ (Value::Object(_) | Value::Array(_))) => Some(v),
        _ => None,
    }
}

/// Drop control characters other than tab, newline and carriage return.
fn strip_control(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// From the first `open` to the last `close`.
fn delimited_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    text.get(start..end + close.len_utf8())
}

/// Repair common syntax damage in near-JSON text.
pub fn repair_syntax(text: &str) -> String {
    let chars: Vec<char> = text
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{00AB}' | '\u{00BB}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect();

    let mut out = String::with_capacity(text.len() + 16);
    let mut delim: Option<char> = None;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(d) = delim {
            if escaped {
                out.push(c);
                escaped = false;
            } else if c == '\\' {
                out.push(c);
                escaped = true;
            } else if c == d {
                if closes_string(&chars, i + 1) {
                    out.push('"');
                    delim = None;
                } else if d == '"' {
                    out.push_str("\\\"");
                } else {
                    out.push(c);
                }
            } else {
                match c {
                    '"' => out.push_str("\\\""),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    _ => out.push(c),
                }
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => {
                delim = Some(c);
                out.push('"');
            }
            ',' if matches!(next_significant(&chars, i + 1), Some('}' | ']')) => {}
            c if is_key_start(c) && matches!(last_significant(&out), Some('{' | ',')) => {
                let start = i;
                while i < chars.len() && is_key_char(chars[i]) {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                if next_significant(&chars, i) == Some(':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }

    if delim.is_some() {
        out.push('"');
    }
    out
}

/// A quote closes its string when the next significant character is a
/// structural one (or the text ends).
fn closes_string(chars: &[char], from: usize) -> bool {
    matches!(
        next_significant(chars, from),
        None | Some(',' | '}' | ']' | ':')
    )
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars.get(from..)?.iter().copied().find(|c| !c.is_whitespace())
}

fn last_significant(out: &str) -> Option<char> {
    out.chars().rev().find(|c| !c.is_whitespace())
}

fn is_key_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '-')
}

/// Rebuild a flat object from `"key": value` pairs anywhere in the text.
/// Later occurrences of a key win.
fn reconstruct(raw: &str) -> Option<Value> {
    let mut map = Map::new();
    for cap in PAIR.captures_iter(raw) {
        let (Some(key), Some(value)) = (cap.get(1), cap.get(2)) else {
            continue;
        };
        let text = value.as_str();
        let parsed = serde_json::from_str::<Value>(text)
            .ok()
            .or_else(|| serde_json::from_str::<Value>(&repair_syntax(text)).ok());
        if let Some(v) = parsed {
            map.insert(key.as_str().to_string(), v);
        }
    }
    (!map.is_empty()).then_some(Value::Object(map))
}
