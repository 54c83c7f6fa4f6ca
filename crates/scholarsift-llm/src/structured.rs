//! Extraction of structured fields from model output.
//!
//! Models are asked for a JSON object, but the answer may arrive wrapped in
//! code fences, surrounded by prose, or truncated. Parsing tries, in order:
//! the whole (fence-stripped) text as JSON, the outermost `{...}` span as
//! JSON, then a per-field regex scan. If none of the requested fields can be
//! recovered the output is `ModelCallError::Unparseable`.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

use crate::backend::ModelCallError;

/// Remove a leading ```` ```lang ```` line and a trailing fence, if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match after_open.find('\n') {
        Some(nl) => &after_open[nl + 1..],
        None => after_open,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Best-effort JSON object extraction.
pub fn extract_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let body = strip_code_fences(text);
    if let Ok(Value::Object(map)) = serde_json::from_str(body) {
        return Some(map);
    }
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&body[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Recover the string fields named in `fields`.
///
/// Missing fields map to empty strings; array values are joined with ", ".
/// Errors only when no field at all could be found.
pub fn parse_fields(text: &str, fields: &[&str]) -> Result<HashMap<String, String>, ModelCallError> {
    if let Some(map) = extract_json_object(text) {
        if fields.iter().any(|f| map.contains_key(*f)) {
            return Ok(fields
                .iter()
                .map(|f| (f.to_string(), map.get(*f).map(value_to_text).unwrap_or_default()))
                .collect());
        }
    }

    let mut found = 0;
    let out: HashMap<String, String> = fields
        .iter()
        .map(|f| {
            let value = regex_field(text, f);
            if value.is_some() {
                found += 1;
            }
            (f.to_string(), value.unwrap_or_default())
        })
        .collect();

    if found == 0 {
        let preview: String = text.chars().take(120).collect();
        return Err(ModelCallError::Unparseable(preview));
    }
    tracing::debug!(found, wanted = fields.len(), "structured output recovered by field scan");
    Ok(out)
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn regex_field(text: &str, field: &str) -> Option<String> {
    let pattern = format!(r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#, regex::escape(field));
    let re = Regex::new(&pattern).ok()?;
    let raw = re.captures(text)?.get(1)?.as_str();
    // Reuse the JSON string grammar to resolve escapes; keep raw text if that fails.
    let decoded = serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_string());
    Some(decoded.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[&str] = &["title_zh", "keywords"];

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  plain  "), "plain");
    }

    #[test]
    fn test_parse_plain_json() {
        let out = parse_fields(r#"{"title_zh": "标题", "keywords": "a，b"}"#, FIELDS).unwrap();
        assert_eq!(out["title_zh"], "标题");
        assert_eq!(out["keywords"], "a，b");
    }

    #[test]
    fn test_parse_json_with_prose_and_arrays() {
        let text = "Sure! Here it is:\n```json\n{\"keywords\": [\"x\", \"y\"]}\n```\nHope that helps.";
        let out = parse_fields(text, FIELDS).unwrap();
        assert_eq!(out["keywords"], "x, y");
        assert_eq!(out["title_zh"], "");
    }

    #[test]
    fn test_regex_fallback_on_broken_json() {
        let text = r#"{"title_zh": "带\"引号\"的标题", "keywords": "a, b", "relevance_summary": "trunc"#;
        let out = parse_fields(text, FIELDS).unwrap();
        assert_eq!(out["title_zh"], "带\"引号\"的标题");
        assert_eq!(out["keywords"], "a, b");
    }

    #[test]
    fn test_unparseable() {
        let err = parse_fields("I cannot help with that.", FIELDS).unwrap_err();
        assert!(matches!(err, ModelCallError::Unparseable(_)));
    }
}
