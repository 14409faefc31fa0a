//! Pulls a JSON object out of free-form model output.
//!
//! Models wrap JSON in markdown fences or surround it with prose. The
//! strategies here are tried in order:
//! 1. A ```json fenced block
//! 2. Any fenced block containing an object
//! 3. The whole response, when it is an object
//! 4. The last balanced object that parses

use regex::Regex;

const JSON_FENCE: &str = r"```json\s*\n?([\s\S]*?)\n?```";
const ANY_FENCE: &str = r"```(?:\w+)?\s*\n?([\s\S]*?)\n?```";

fn fenced_object(content: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    let block = re.captures(content)?.get(1)?;
    balanced_object(block.as_str().trim())
}

/// Returns the first JSON object found in `content` that parses.
pub fn extract_json_object(content: &str) -> Option<String> {
    let trimmed = content.trim();

    for pattern in [JSON_FENCE, ANY_FENCE] {
        if let Some(json) = fenced_object(trimmed, pattern) {
            return Some(json);
        }
    }

    if trimmed.starts_with('{') {
        if let Some(json) = balanced_object(trimmed) {
            return Some(json);
        }
    }

    last_valid_object(trimmed)
}

/// Index of the brace closing the object that opens at the start of `s`.
///
/// Braces inside string literals, including escaped quotes, are ignored.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn balanced_object(s: &str) -> Option<String> {
    let start = s.find('{')?;
    let end = find_matching_brace(&s[start..])?;
    let candidate = &s[start..=start + end];
    serde_json::from_str::<serde_json::Value>(candidate)
        .ok()
        .filter(serde_json::Value::is_object)
        .map(|_| candidate.to_string())
}

fn last_valid_object(s: &str) -> Option<String> {
    s.char_indices()
        .filter(|(_, c)| *c == '{')
        .map(|(i, _)| i)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .filter_map(|start| balanced_object(&s[start..]))
        .max_by_key(String::len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let json = extract_json_object(r#"  {"score": 90}  "#).unwrap();
        assert_eq!(json, r#"{"score": 90}"#);
    }

    #[test]
    fn test_fenced_block() {
        let content = "Here is the analysis:\n```json\n{\"score\": 72, \"notes\": \"}\"}\n```\nDone.";
        let json = extract_json_object(content).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["score"], 72);
        assert_eq!(value["notes"], "}");
    }

    #[test]
    fn test_generic_fence() {
        let content = "```\n{\"ok\": true}\n```";
        assert_eq!(extract_json_object(content).unwrap(), "{\"ok\": true}");
    }

    #[test]
    fn test_prose_around_object() {
        let content = "Thinking about {this}. Final answer: {\"overall_assessment\": \"APPROVED\", \"nested\": {\"a\": 1}} thanks";
        let json = extract_json_object(content).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["overall_assessment"], "APPROVED");
        assert_eq!(value["nested"]["a"], 1);
    }

    #[test]
    fn test_no_object() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{\"truncated\": ").is_none());
    }

    #[test]
    fn test_find_matching_brace() {
        assert_eq!(find_matching_brace("{\"a\": {\"b\": 1}}"), Some(14));
        assert_eq!(find_matching_brace("{\"a\": \"\\\"}\"}"), Some(11));
        assert_eq!(find_matching_brace("{"), None);
        assert_eq!(find_matching_brace("}"), None);
    }
}
