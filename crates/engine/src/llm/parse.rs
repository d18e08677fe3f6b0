//! Pulling structured data out of free-form model replies.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref FENCED_BLOCK: Option<Regex> =
        Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\}|\[.*?\])\s*```").ok();
}

/// Finds the first JSON object or array in `response`.
///
/// Tries, in order: the whole reply, a fenced code block, and the first
/// balanced `{...}` or `[...]` span that parses. Scalars never count.
pub fn parse_json_from_llm_response(response: &str) -> Option<Value> {
    let trimmed = response.trim();
    if let Some(value) = structured(trimmed) {
        return Some(value);
    }

    if let Some(re) = FENCED_BLOCK.as_ref() {
        for captures in re.captures_iter(response) {
            if let Some(value) = captures.get(1).and_then(|m| structured(m.as_str())) {
                return Some(value);
            }
        }
    }

    balanced_spans(response).into_iter().find_map(structured)
}

fn structured(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

/// Balanced `{...}` / `[...]` spans ordered by where they open, found in a
/// single pass. Brackets inside string literals are ignored; quotes outside
/// any bracket are prose.
fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if !open.is_empty() => in_string = true,
            '{' | '[' => open.push(i),
            '}' | ']' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i + c.len_utf8()));
                }
            }
            _ => {}
        }
    }

    spans.sort_by_key(|(start, _)| *start);
    spans.into_iter().map(|(start, end)| &text[start..end]).collect()
}
