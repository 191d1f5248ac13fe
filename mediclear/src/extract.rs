//! Lenient extraction of a JSON object from free-text model output.
//!
//! Models are asked to answer with a bare JSON object but routinely wrap it in
//! markdown fences or prose. The greedy `{ ... }` span (first opening brace to
//! last closing brace) is tried first; when that span does not parse, the first
//! balanced top-level object is tried instead.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static GREEDY_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("valid object regex"));

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no JSON object found in text")]
    NoJsonObject,

    #[error("found a JSON-like block but it is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
}

/// Returns the slice of `text` holding the first usable JSON object.
pub fn extract_json_object(text: &str) -> Result<&str, ExtractError> {
    let greedy = GREEDY_OBJECT
        .find(text)
        .ok_or(ExtractError::NoJsonObject)?
        .as_str();

    let greedy_err = match serde_json::from_str::<serde_json::Value>(greedy) {
        Ok(value) if value.is_object() => return Ok(greedy),
        Ok(_) => None,
        Err(e) => Some(e),
    };

    if let Some(balanced) = first_balanced_object(text) {
        match serde_json::from_str::<serde_json::Value>(balanced) {
            Ok(value) if value.is_object() => return Ok(balanced),
            Ok(_) => {}
            Err(e) => return Err(ExtractError::InvalidJson(greedy_err.unwrap_or(e))),
        }
    }

    match greedy_err {
        Some(e) => Err(ExtractError::InvalidJson(e)),
        None => Err(ExtractError::NoJsonObject),
    }
}

/// Parses the extracted object into `T`.
pub fn extract_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, ExtractError> {
    let object = extract_json_object(text)?;
    serde_json::from_str(object).map_err(ExtractError::InvalidJson)
}

fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_bare_object() {
        let text = r#"{"summary": "ok", "metrics": []}"#;
        assert_eq!(extract_json_object(text).unwrap(), text);
    }

    #[test]
    fn test_markdown_fence_is_ignored() {
        let text = "```json\n{\"summary\": \"ok\"}\n```";
        assert_eq!(extract_json_object(text).unwrap(), r#"{"summary": "ok"}"#);
    }

    #[test]
    fn test_prose_around_object() {
        let text = "Here is the analysis:\n{\"a\": {\"b\": 1}}\nHope this helps.";
        let value: Value = extract_json(text).unwrap();
        assert_eq!(value["a"]["b"], 1);
    }

    #[test]
    fn test_trailing_braces_fall_back_to_balanced_object() {
        // the greedy span runs to the last `}` and is not valid JSON
        let text = r#"{"summary": "ok"} and a note {like this}"#;
        assert_eq!(extract_json_object(text).unwrap(), r#"{"summary": "ok"}"#);
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"noise {"summary": "range {12-15}", "x": "quote \" }"} tail"#;
        let value: Value = extract_json(text).unwrap();
        assert_eq!(value["summary"], "range {12-15}");
    }

    #[test]
    fn test_no_object() {
        assert!(matches!(
            extract_json_object("I could not read this document."),
            Err(ExtractError::NoJsonObject)
        ));
        assert!(matches!(
            extract_json_object("closing } before opening {"),
            Err(ExtractError::NoJsonObject)
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            extract_json_object("{summary: unquoted}"),
            Err(ExtractError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_unicode_content() {
        let text = "উত্তৰ: {\"summary\": \"ৰক্তহীনতা (Anemia)\"}";
        let value: Value = extract_json(text).unwrap();
        assert_eq!(value["summary"], "ৰক্তহীনতা (Anemia)");
    }
}
