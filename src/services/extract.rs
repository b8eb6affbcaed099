// src/services/extract.rs

//! Embedded-data extraction.
//!
//! Tier pages ship their data as a JavaScript literal inside a hydration
//! script, right after [`EMBEDDED_MARKER`]. Extraction happens in three steps:
//!
//! 1. [`find_embedded_literal`] isolates the first balanced `[...]` span after
//!    the marker.
//! 2. [`repair`] rewrites that span into strict JSON.
//! 3. [`decode_records`] parses it and reads the records.
//!
//! # Tolerated literal grammar
//!
//! The repair step accepts JSON plus the following forms, applied only
//! outside string literals:
//!
//! | Form                        | Example        | Rewritten to      |
//! |-----------------------------|----------------|-------------------|
//! | bare identifier key         | `{god:"Ra"}`   | `{"god":"Ra"}`    |
//! | leading-dot decimal         | `[.5,{x:.2}]`  | `[0.5,{"x":0.2}]`|
//! | negative leading-dot        | `{d:-.5}`      | `{"d":-0.5}`      |
//! | `undefined` value           | `{a:undefined}`| `{"a":null}`      |
//!
//! A key is an identifier (`[A-Za-z_$][A-Za-z0-9_$]*`) directly after `{` or
//! `,` and followed by `:`. A leading-dot decimal is only rewritten in value
//! position, after `:`, `[` or `,`. Double-quoted strings are copied verbatim,
//! escapes included.

use serde_json::Value;

use crate::error::ExtractError;
use crate::models::ScrapedRecord;

/// Text that precedes the embedded data literal.
pub const EMBEDDED_MARKER: &str = "resolve(1, () =>";

const CHALLENGE_SIGNS: [&str; 2] = ["just a moment", "cf-browser-verification"];

/// Whether the page is an anti-bot interstitial instead of content.
pub fn is_challenge_page(html: &str) -> bool {
    let lower = html.to_lowercase();
    CHALLENGE_SIGNS.iter().any(|sign| lower.contains(sign))
}

/// Return the first balanced `[...]` span after `marker`.
///
/// Brackets inside string literals are ignored. `None` when the marker, the
/// opening bracket or the matching close is missing.
pub fn find_embedded_literal<'a>(html: &'a str, marker: &str) -> Option<&'a str> {
    let after_marker = html.find(marker)? + marker.len();
    let start = after_marker + html[after_marker..].find('[')?;

    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for (offset, byte) in html.as_bytes()[start..].iter().enumerate() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == q {
                quote = None;
            }
            continue;
        }

        match byte {
            b'"' | b'\'' | b'`' => quote = Some(*byte),
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&html[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Rewrite a JavaScript-style literal into strict JSON.
///
/// See the module documentation for the accepted forms. Anything else is
/// passed through unchanged and left for the JSON parser to reject.
pub fn repair(literal: &str) -> String {
    let chars: Vec<char> = literal.chars().collect();
    let mut out = String::with_capacity(literal.len() + literal.len() / 8);
    // Last significant character emitted outside a string.
    let mut prev: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '"' {
            let end = string_end(&chars, i);
            out.extend(&chars[i..end]);
            prev = Some('"');
            i = end;
            continue;
        }

        if c.is_whitespace() {
            out.push(c);
            i += 1;
            continue;
        }

        let value_position = matches!(prev, Some(':' | '[' | ','));

        if is_ident_start(c) {
            let end = ident_end(&chars, i);
            let ident: String = chars[i..end].iter().collect();
            let key_position = matches!(prev, Some('{' | ','));

            if key_position && next_significant(&chars, end) == Some(':') {
                out.push('"');
                out.push_str(&ident);
                out.push('"');
            } else if value_position && ident == "undefined" {
                out.push_str("null");
            } else {
                out.push_str(&ident);
            }
            prev = chars.get(end - 1).copied();
            i = end;
            continue;
        }

        if value_position && c == '.' && next_is_digit(&chars, i + 1) {
            out.push_str("0.");
            prev = Some('0');
            i += 1;
            continue;
        }

        if value_position && c == '-' && chars.get(i + 1) == Some(&'.') && next_is_digit(&chars, i + 2) {
            out.push_str("-0.");
            prev = Some('0');
            i += 2;
            continue;
        }

        out.push(c);
        prev = Some(c);
        i += 1;
    }

    out
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn ident_end(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_' || chars[end] == '$') {
        end += 1;
    }
    end
}

/// Index one past the closing quote of the string starting at `start`, or the
/// end of input for an unterminated string.
fn string_end(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '"' => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from..].iter().copied().find(|c| !c.is_whitespace())
}

fn next_is_digit(chars: &[char], at: usize) -> bool {
    chars.get(at).is_some_and(char::is_ascii_digit)
}

/// Pick the record array out of the decoded root.
///
/// The page nests the list one level deep (`[[...], ...]`); a flat array is
/// accepted as-is and anything else holds no records.
fn record_elements(root: &Value) -> &[Value] {
    match root {
        Value::Array(outer) => match outer.first() {
            Some(Value::Array(inner)) => inner.as_slice(),
            _ => outer.as_slice(),
        },
        _ => &[],
    }
}

/// Extract, repair and decode the tier records embedded in a page.
pub fn decode_records(html: &str) -> Result<Vec<ScrapedRecord>, ExtractError> {
    if is_challenge_page(html) {
        return Err(ExtractError::Challenged);
    }

    let literal = find_embedded_literal(html, EMBEDDED_MARKER).ok_or(ExtractError::NotFound)?;
    let json = repair(literal);
    let root: Value =
        serde_json::from_str(&json).map_err(|e| ExtractError::decode(e, literal))?;

    Ok(record_elements(&root)
        .iter()
        .filter_map(ScrapedRecord::from_value)
        .collect())
}
