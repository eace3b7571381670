//! JSON extraction and repair for untrusted model output.
//!
//! Models wrap JSON in markdown fences, truncate mid-string when token
//! budgets run out, and leave trailing commas. [`extract_and_repair`] is the
//! single funnel all structured output passes through: it never fails,
//! returning the best-effort parsed object or an empty map. Domain validation
//! of the result (required keys, numeric ranges) happens in the stage
//! modules, not here.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

pub type JsonMap = serde_json::Map<String, Value>;

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").expect("static regex"))
}

fn dangling_tail_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A `, "key"` or `{ "key"` opener at end of input, with an optional
    // colon and partial non-string value after it.
    RE.get_or_init(|| {
        Regex::new(r#"(?s)[,{]\s*"(?:[^"\\]|\\.)*"\s*(?::\s*[^,{}\[\]"]*)?$"#)
            .expect("static regex")
    })
}

fn string_pair_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""([A-Za-z0-9_][A-Za-z0-9_\- ]*)"\s*:\s*"((?:[^"\\]|\\.)*)""#)
            .expect("static regex")
    })
}

/// Coerces raw model text into a JSON object, by any means necessary.
///
/// Tries, in order and short-circuiting on first success: fenced-block
/// extraction, brace slicing, strict parse, light repair (balance closers +
/// strip trailing commas), aggressive repair (quote-state scan, dangling-tail
/// truncation), and finally salvage of up to five string-valued pairs.
/// Always returns; `{}` is the floor.
pub fn extract_and_repair(raw: &str) -> JsonMap {
    let candidate = extract_fenced(raw).unwrap_or_else(|| raw.to_string());
    let candidate = candidate.trim();
    let sliced = if candidate.starts_with('{') {
        candidate.to_string()
    } else {
        slice_braces(candidate).unwrap_or_else(|| candidate.to_string())
    };

    if let Some(map) = parse_object(&sliced) {
        return map;
    }
    if let Some(map) = light_repair(&sliced) {
        return map;
    }
    if let Some(map) = aggressive_repair(&sliced) {
        return map;
    }
    salvage_pairs(raw)
}

/// Recovers source text from a model response that may be fenced in
/// markdown. A payload that already starts with a document root passes
/// through untouched.
pub fn extract_code_block(raw: &str) -> String {
    if let Some(block) = extract_fenced(raw) {
        return block.trim().to_string();
    }
    raw.trim().to_string()
}

fn extract_fenced(raw: &str) -> Option<String> {
    let start = raw.find("```")?;
    let after = &raw[start + 3..];
    let end = after.find("```")?;
    let mut block = &after[..end];
    // Strip a leading language tag line ("json", "html", "gdscript", ...).
    if let Some(newline) = block.find('\n') {
        let tag = block[..newline].trim();
        if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '#')
        {
            block = &block[newline + 1..];
        }
    }
    Some(block.to_string())
}

fn slice_braces(text: &str) -> Option<String> {
    let first = text.find('{')?;
    let last = text.rfind('}')?;
    if last > first {
        Some(text[first..=last].to_string())
    } else {
        // Opening brace with no closer yet: take the tail and let the
        // repair passes balance it.
        Some(text[first..].to_string())
    }
}

fn parse_object(text: &str) -> Option<JsonMap> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn light_repair(text: &str) -> Option<JsonMap> {
    let balanced = balance_delimiters(text);
    let cleaned = trailing_comma_re().replace_all(&balanced, "$1");
    parse_object(&cleaned)
}

fn aggressive_repair(text: &str) -> Option<JsonMap> {
    let mut repaired = text.to_string();
    if ends_inside_string(&repaired) {
        repaired.push('"');
    }
    if let Some(m) = dangling_tail_re().find(&repaired) {
        let keep = if repaired[m.start()..].starts_with('{') {
            m.start() + 1
        } else {
            m.start()
        };
        repaired.truncate(keep);
    }
    let balanced = balance_delimiters(&repaired);
    let cleaned = trailing_comma_re().replace_all(&balanced, "$1");
    parse_object(&cleaned)
}

fn salvage_pairs(raw: &str) -> JsonMap {
    let mut map = JsonMap::new();
    for caps in string_pair_re().captures_iter(raw).take(5) {
        let key = caps[1].to_string();
        let escaped = &caps[2];
        // Reuse the JSON string grammar to unescape the captured value.
        let value = serde_json::from_str::<Value>(&format!("\"{escaped}\""))
            .unwrap_or_else(|_| Value::String(escaped.to_string()));
        map.insert(key, value);
    }
    map
}

/// Appends the closers for any `{`/`[` left open outside string context.
fn balance_delimiters(text: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => stack.push(ch),
            '}' if !in_string => {
                if stack.last() == Some(&'{') {
                    stack.pop();
                }
            }
            ']' if !in_string => {
                if stack.last() == Some(&'[') {
                    stack.pop();
                }
            }
            _ => {}
        }
    }
    let mut balanced = text.to_string();
    while let Some(open) = stack.pop() {
        balanced.push(if open == '{' { '}' } else { ']' });
    }
    balanced
}

fn ends_inside_string(text: &str) -> bool {
    let mut in_string = false;
    let mut escaped = false;
    for ch in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            _ => {}
        }
    }
    in_string
}

// Lenient field accessors used by the stage parsers. Models emit numbers as
// strings often enough that numeric lookup accepts both.

pub(crate) fn str_field(map: &JsonMap, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

pub(crate) fn num_field(map: &JsonMap, key: &str) -> Option<f64> {
    match map.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn bool_field(map: &JsonMap, key: &str) -> Option<bool> {
    map.get(key)?.as_bool()
}

pub(crate) fn obj_field<'a>(map: &'a JsonMap, key: &str) -> Option<&'a JsonMap> {
    map.get(key)?.as_object()
}

pub(crate) fn arr_field<'a>(map: &'a JsonMap, key: &str) -> Option<&'a Vec<Value>> {
    map.get(key)?.as_array()
}

pub(crate) fn str_list(map: &JsonMap, key: &str) -> Vec<String> {
    arr_field(map, key)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}
