//! Payload decoding and next-step input templates

use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;

use crate::classifier::TERMINAL_SENTINEL;
use crate::Fault;

fn mcp_result_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""result":\s*"((?:[^"\\]|\\.)*)""#).unwrap())
}

fn mcp_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"text='((?:[^'\\]|\\.)*)'"#).unwrap())
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);").unwrap())
}

/// Turn an escaped or wrapped capability payload into plain text
///
/// Single rewrites are applied until none of them shortens the text any
/// further, so `decode(decode(x)) == decode(x)` for plain and escaped text.
/// Text produced by a JSON decode has its escapes consumed already; it is
/// never unescaped again, so literal backslashes inside a JSON string survive.
pub fn decode(text: &str) -> String {
    let mut current = text.trim().to_string();
    let mut json_decoded = false;
    while let Some((next, kind)) = decode_pass(&current, json_decoded) {
        match kind {
            PassKind::Json => json_decoded = true,
            PassKind::Raw => json_decoded = false,
            PassKind::Unescape | PassKind::Entities => {}
        }
        current = next;
    }
    current
}

type Pass = fn(&str) -> Option<String>;

/// What a rewrite leaves behind
#[derive(Clone, Copy, PartialEq)]
enum PassKind {
    /// the content of a JSON string, escapes already resolved
    Json,
    /// a verbatim slice of printed text, escapes still pending
    Raw,
    Unescape,
    Entities,
}

const PASSES: [(Pass, PassKind); 5] = [
    (unwrap_json_string, PassKind::Json),
    (unwrap_container, PassKind::Json),
    (extract_text_content, PassKind::Raw),
    (unescape, PassKind::Unescape),
    (decode_entities, PassKind::Entities),
];

fn decode_pass(text: &str, json_decoded: bool) -> Option<(String, PassKind)> {
    PASSES
        .iter()
        .filter(|(_, kind)| !(json_decoded && *kind == PassKind::Unescape))
        .find_map(|(pass, kind)| {
            pass(text)
                .map(|next| next.trim().to_string())
                .filter(|next| next.len() < text.len())
                .map(|next| (next, *kind))
        })
}

fn unwrap_json_string(text: &str) -> Option<String> {
    if text.len() < 2 || !text.starts_with('"') || !text.ends_with('"') {
        return None;
    }
    serde_json::from_str::<String>(text).ok()
}

/// `{"result": ...}`, `{"content": [{"text": ...}]}` or a bare content list
fn unwrap_container(text: &str) -> Option<String> {
    if !(text.starts_with('{') || text.starts_with('[')) {
        return None;
    }
    let value: Value = serde_json::from_str(text).ok()?;

    if let Some(result) = value.get("result") {
        return Some(match result {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    }

    let items = value
        .get("content")
        .and_then(|c| c.as_array())
        .or_else(|| value.as_array())?;
    let texts: Vec<&str> = items
        .iter()
        .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    }
}

/// Payload of a printed MCP `TextContent(...)` value
fn extract_text_content(text: &str) -> Option<String> {
    if !text.contains("TextContent(") {
        return None;
    }
    mcp_result_re()
        .captures(text)
        .or_else(|| mcp_text_re().captures(text))
        .map(|caps| caps[1].to_string())
}

fn unescape(text: &str) -> Option<String> {
    if !text.contains('\\') {
        return None;
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '\\' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let replacement = match chars[i + 1] {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            '"' => Some('"'),
            '\'' => Some('\''),
            '\\' => Some('\\'),
            '/' => Some('/'),
            _ => None,
        };
        if let Some(c) = replacement {
            out.push(c);
            i += 2;
            continue;
        }

        if chars[i + 1] == 'u' {
            if let Some((c, consumed)) = unicode_escape(&chars[i..]) {
                out.push(c);
                i += consumed;
                continue;
            }
        }

        out.push('\\');
        i += 1;
    }

    (out != text).then_some(out)
}

/// `\uXXXX`, or a `\uXXXX\uXXXX` surrogate pair, at the start of `chars`
fn unicode_escape(chars: &[char]) -> Option<(char, usize)> {
    let unit = |at: usize| -> Option<u32> {
        if chars.get(at) != Some(&'\\') || chars.get(at + 1) != Some(&'u') {
            return None;
        }
        let digits = chars.get(at + 2..at + 6)?;
        if !digits.iter().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        u32::from_str_radix(&digits.iter().collect::<String>(), 16).ok()
    };

    let first = unit(0)?;
    match first {
        0xD800..=0xDBFF => {
            let second = unit(6).filter(|s| (0xDC00..=0xDFFF).contains(s))?;
            let combined = 0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00);
            char::from_u32(combined).map(|c| (c, 12))
        }
        0xDC00..=0xDFFF => None,
        _ => char::from_u32(first).map(|c| (c, 6)),
    }
}

fn decode_entities(text: &str) -> Option<String> {
    if !text.contains('&') {
        return None;
    }

    let decoded = entity_re().replace_all(text, |caps: &Captures| {
        let body = &caps[1];
        let c = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = body.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            match body {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => None,
            }
        };
        c.map(String::from).unwrap_or_else(|| caps[0].to_string())
    });

    (decoded != text).then(|| decoded.into_owned())
}

/// Next working input after a continuation
pub fn forward_result(task: &str, payload: &str) -> String {
    format!(
        "Original user task: {}\n\nYour last tool produced this result:\n\n{}\n\nIf this fully answers the task, return:\n{} your answer\n\nOtherwise, return the next plan.",
        task,
        decode(payload),
        TERMINAL_SENTINEL
    )
}

/// Next working input after a recoverable fault
pub fn forward_fault(task: &str, fault: &Fault) -> String {
    format!(
        "Original user task: {}\n\nYour last step failed: {}\n\nIf you can already answer the task, return:\n{} your answer\n\nOtherwise, return a corrected plan that invokes exactly one capability.",
        task, fault, TERMINAL_SENTINEL
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unicode_escape_pair() {
        let chars: Vec<char> = r"\ud83d\ude00".chars().collect();
        assert_eq!(unicode_escape(&chars), Some(('😀', 12)));
    }

    #[test]
    fn test_unicode_escape_lone_surrogate() {
        let chars: Vec<char> = r"\ud83d tail".chars().collect();
        assert_eq!(unicode_escape(&chars), None);
    }

    #[test]
    fn test_unescape_leaves_unknown_escapes() {
        assert_eq!(unescape(r"C:\qux"), None);
        assert_eq!(unescape(r"a\nb").as_deref(), Some("a\nb"));
    }

    #[test]
    fn test_decode_entities_unknown_named() {
        assert_eq!(decode_entities("&bogus; stays"), None);
        assert_eq!(decode_entities("a &amp; b").as_deref(), Some("a & b"));
    }
}
