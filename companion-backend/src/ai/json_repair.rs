//! Recovery of JSON payloads from free-form model output.
//!
//! Models asked for "only JSON" still wrap it in markdown fences, add a sentence
//! before it, or stop mid-object when they hit the token limit. Every memory job
//! goes through `recover_json` instead of calling `serde_json` directly.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*(?:```|$)").expect("valid fence regex"));

/// How many opener positions to try before giving up on prose-heavy output.
const MAX_START_ATTEMPTS: usize = 8;

/// Recover a JSON value from model output.
///
/// With `expect_array` the result is always an array (a lone object is wrapped,
/// an object holding exactly one array field is unwrapped). Otherwise the result
/// is always an object. Returns `None` when nothing usable can be salvaged.
pub fn recover_json(text: &str, expect_array: bool) -> Option<Value> {
    let cleaned = strip_code_fences(text);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        if let Some(shaped) = coerce_shape(value, expect_array) {
            return Some(shaped);
        }
    }

    let (primary, secondary) = if expect_array { ('[', '{') } else { ('{', '[') };
    for opener in [primary, secondary] {
        let starts = cleaned
            .char_indices()
            .filter(|(_, c)| *c == opener)
            .map(|(i, _)| i)
            .take(MAX_START_ATTEMPTS);

        for start in starts {
            let fragment = &cleaned[start..];
            let candidate = match extract_balanced(fragment) {
                Some(balanced) => balanced.to_string(),
                None => match repair_truncated(fragment) {
                    Some(repaired) => repaired,
                    None => continue,
                },
            };
            if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
                if let Some(shaped) = coerce_shape(value, expect_array) {
                    return Some(shaped);
                }
            }
        }
    }

    None
}

/// Remove markdown code fences, keeping the fenced body when there is one.
pub fn strip_code_fences(text: &str) -> String {
    if !text.contains("```") {
        return text.to_string();
    }
    FENCE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| text.replace("```", ""))
}

/// Return the prefix of `fragment` (which starts at `{` or `[`) up to the matching
/// closer, or `None` when the input ends first. String contents and escapes are skipped.
pub fn extract_balanced(fragment: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (i, c) in fragment.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&fragment[..i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// An open container while scanning a truncated fragment.
struct Frame {
    closer: char,
    /// End of the last complete element, or just past the opener.
    boundary: usize,
}

/// Best-effort completion of output that stopped mid-value.
///
/// Inside an array the unfinished element is always dropped: the outermost
/// open array is cut back to its last complete element and closed there.
/// Without an open array, first tries closing the open string and every open
/// object as-is. If that does not parse (dangling key, half-written literal),
/// cuts back to the last complete member and closes from there.
pub fn repair_truncated(fragment: &str) -> Option<String> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut in_string = false;
    let mut escape = false;
    let mut last_safe: Option<(usize, Vec<char>)> = None;

    for (i, c) in fragment.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push(Frame { closer: '}', boundary: i + 1 }),
            '[' => stack.push(Frame { closer: ']', boundary: i + 1 }),
            '}' | ']' => {
                if stack.pop().map(|f| f.closer) != Some(c) {
                    return None;
                }
                let parent = stack.last_mut()?;
                parent.boundary = i + 1;
                last_safe = Some((i + 1, closers(&stack)));
            }
            ',' => {
                if let Some(frame) = stack.last_mut() {
                    frame.boundary = i;
                }
                last_safe = Some((i, closers(&stack)));
            }
            _ => {}
        }
    }

    if stack.is_empty() {
        return None;
    }

    if let Some(j) = stack.iter().position(|f| f.closer == ']') {
        return close_at(fragment, stack[j].boundary, &closers(&stack[..=j]));
    }

    let mut direct = fragment.trim_end().to_string();
    if in_string {
        if escape {
            direct.pop();
        }
        direct.push('"');
    }
    let mut candidate = direct
        .trim_end_matches(|c: char| c.is_whitespace() || c == ',')
        .to_string();
    candidate.extend(closers(&stack).iter().rev());
    if serde_json::from_str::<Value>(&candidate).is_ok() {
        return Some(candidate);
    }

    let (cut, snapshot) = last_safe?;
    close_at(fragment, cut, &snapshot)
}

fn closers(frames: &[Frame]) -> Vec<char> {
    frames.iter().map(|f| f.closer).collect()
}

/// Keep `fragment[..cut]` minus trailing commas and append `closers` innermost first.
fn close_at(fragment: &str, cut: usize, closers: &[char]) -> Option<String> {
    let mut candidate = fragment[..cut]
        .trim_end_matches(|c: char| c.is_whitespace() || c == ',')
        .to_string();
    candidate.extend(closers.iter().rev());
    serde_json::from_str::<Value>(&candidate).ok().map(|_| candidate)
}

fn coerce_shape(value: Value, expect_array: bool) -> Option<Value> {
    match (expect_array, value) {
        (true, Value::Array(items)) => Some(Value::Array(items)),
        (true, Value::Object(map)) => {
            let arrays: Vec<&Value> = map.values().filter(|v| v.is_array()).collect();
            if map.len() == 1 && arrays.len() == 1 {
                Some(arrays[0].clone())
            } else {
                Some(Value::Array(vec![Value::Object(map)]))
            }
        }
        (false, Value::Object(map)) => Some(Value::Object(map)),
        (false, Value::Array(items)) => items.into_iter().find(|v| v.is_object()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_and_fenced_json() {
        assert_eq!(recover_json(r#"{"a": 1}"#, false), Some(json!({"a": 1})));
        let fenced = "```json\n[{\"key\": \"name\"}]\n```";
        assert_eq!(recover_json(fenced, true), Some(json!([{"key": "name"}])));
    }

    #[test]
    fn test_json_embedded_in_prose() {
        let text = "Sure! Here is the analysis: {\"summary\": \"they talked\", \"importance\": 4} Hope it helps.";
        let value = recover_json(text, false).unwrap();
        assert_eq!(value["importance"], 4);
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_the_scanner() {
        let text = r#"Result: {"value": "likes {curly} braces and \"quotes\"", "n": 2} trailing }"#;
        let value = recover_json(text, false).unwrap();
        assert_eq!(value["value"], "likes {curly} braces and \"quotes\"");
        assert_eq!(value["n"], 2);
    }

    #[test]
    fn test_truncated_array_keeps_complete_items() {
        let text = r#"[{"category": "identity", "key": "name", "value": "Ana"}, {"category": "inter"#;
        let value = recover_json(text, true).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["value"], "Ana");
    }

    #[test]
    fn test_unfinished_item_is_dropped_not_closed() {
        // closing the half-written item would still parse, with a cut-off value
        let text = r#"[{"key": "name", "value": "Ana"}, {"key": "job", "value": "head nur"#;
        assert_eq!(recover_json(text, true), Some(json!([{"key": "name", "value": "Ana"}])));

        let nested = r#"{"facts": [{"key": "name", "value": "Ana"}, {"key": "job", "value": "nur"#;
        assert_eq!(recover_json(nested, true), Some(json!([{"key": "name", "value": "Ana"}])));

        let strings = r#"{"summary": "a walk", "topics": ["park", "wal"#;
        let value = recover_json(strings, false).unwrap();
        assert_eq!(value["topics"], json!(["park"]));
        assert_eq!(value["summary"], "a walk");
    }

    #[test]
    fn test_array_without_complete_items_is_empty() {
        assert_eq!(repair_truncated(r#"[{"key": "na"#).as_deref(), Some("[]"));
    }

    #[test]
    fn test_truncated_after_key_cuts_back() {
        let text = r#"{"summary": "a walk in the park", "topics": ["park", "walks"], "emotion":"#;
        let value = recover_json(text, false).unwrap();
        assert_eq!(value["summary"], "a walk in the park");
        assert_eq!(value["topics"], json!(["park", "walks"]));
        assert!(value.get("emotion").is_none());
    }

    #[test]
    fn test_truncated_mid_string_is_closed() {
        let text = r#"{"summary": "they talked about their sis"#;
        let value = recover_json(text, false).unwrap();
        assert_eq!(value["summary"], "they talked about their sis");
    }

    #[test]
    fn test_shape_coercion() {
        assert_eq!(recover_json(r#"{"key": "x"}"#, true), Some(json!([{"key": "x"}])));
        assert_eq!(recover_json(r#"{"facts": [{"key": "x"}]}"#, true), Some(json!([{"key": "x"}])));
        assert_eq!(recover_json(r#"[{"emotion": "joy"}]"#, false), Some(json!({"emotion": "joy"})));
    }

    #[test]
    fn test_unrecoverable_output() {
        assert_eq!(recover_json("I could not find any facts.", true), None);
        assert_eq!(recover_json("", false), None);
        assert_eq!(recover_json("[]", true), Some(json!([])));
    }
}
