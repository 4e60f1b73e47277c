use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::domain::error::{AppError, Result};
use crate::domain::records::decode_record;

static THINK_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<think>[\s\S]*?</think>|<think\s*/>").unwrap());

static MULTIPLE_NEWLINES_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Cleans LLM response by removing reasoning tags and surplus blank lines
pub fn clean_llm_response(response: &str) -> String {
    let mut cleaned = THINK_TAG_PATTERN.replace_all(response, "").to_string();

    cleaned = cleaned.trim().to_string();

    // Collapse multiple consecutive newlines into at most two
    MULTIPLE_NEWLINES_PATTERN
        .replace_all(&cleaned, "\n\n")
        .to_string()
}

/// Parses the text between the first `{` and the last `}`.
///
/// `Ok(None)` when either bracket is missing; malformed JSON in between is an error.
pub fn extract_json_obj(text: &str) -> Result<Option<Value>> {
    extract_between(text, '{', '}')
}

/// Same as [`extract_json_obj`] for `[` ... `]`.
pub fn extract_json_array(text: &str) -> Result<Option<Vec<Value>>> {
    match extract_between(text, '[', ']')? {
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(other) => Err(AppError::ParseError(format!(
            "Expected JSON array, found: {}",
            other
        ))),
        None => Ok(None),
    }
}

fn extract_between(text: &str, open: char, close: char) -> Result<Option<Value>> {
    let Some(start) = text.find(open) else {
        return Ok(None);
    };
    let Some(end) = text.rfind(close) else {
        return Ok(None);
    };
    if end < start {
        return Ok(None);
    }

    serde_json::from_str(&text[start..=end])
        .map(Some)
        .map_err(|e| AppError::ParseError(format!("Invalid JSON in completion: {}", e)))
}

/// Trimmed text between `<tag>` and the following `</tag>`.
pub fn extract_xml_tag(text: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;

    Some(text[start..end].trim().to_string())
}

/// Substring after the last `.`, if any.
pub fn extract_extension(file_name: &str) -> Option<&str> {
    file_name.rfind('.').map(|idx| &file_name[idx + 1..])
}

pub fn strip_code_fence(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(stripped) = trimmed.strip_prefix("```json") {
        return stripped.trim().trim_end_matches("```").trim().to_string();
    }
    if let Some(stripped) = trimmed.strip_prefix("```sql") {
        return stripped.trim().trim_end_matches("```").trim().to_string();
    }
    if let Some(stripped) = trimmed.strip_prefix("```") {
        return stripped.trim().trim_end_matches("```").trim().to_string();
    }
    trimmed.to_string()
}

/// Blank completions are treated as failed ones.
pub fn require_completion(completion: String, what: &str) -> Result<String> {
    if completion.trim().is_empty() {
        return Err(AppError::LLMError(format!("{} not completed.", what)));
    }
    Ok(completion)
}

/// JSON object embedded in a completion, decoded and validated as `T`.
pub fn completion_record<T>(completion: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned + validator::Validate,
{
    let value = extract_json_obj(completion)?.ok_or_else(|| {
        AppError::ParseError(format!("No JSON object in completion: {}", completion))
    })?;
    decode_record(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_think_tags() {
        let input = "<think>Some reasoning here</think>The actual response";
        assert_eq!(clean_llm_response(input), "The actual response");
    }

    #[test]
    fn test_clean_multiple_newlines() {
        let input = "Line 1\n\n\n\n\nLine 2";
        assert_eq!(clean_llm_response(input), "Line 1\n\nLine 2");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extract_extension("a.b.txt"), Some("txt"));
        assert_eq!(extract_extension("2024-11-12_report-13.png"), Some("png"));
        assert_eq!(extract_extension("noext"), None);
        assert_eq!(extract_extension("trailing."), Some(""));
    }

    #[test]
    fn test_json_obj_after_reasoning() {
        let completion = r#"**1 wypowiedź**: mentions Kraków.

{
  "result": "ul. prof. Stanisława Łojasiewicza"
}"#;
        let value = extract_json_obj(completion).unwrap().unwrap();
        assert_eq!(value, json!({ "result": "ul. prof. Stanisława Łojasiewicza" }));
    }

    #[test]
    fn test_json_obj_missing_brackets() {
        assert_eq!(extract_json_obj("no json here").unwrap(), None);
        assert_eq!(extract_json_obj("only { opening").unwrap(), None);
        assert_eq!(extract_json_obj("only } closing").unwrap(), None);
        assert_eq!(extract_json_obj("} reversed {").unwrap(), None);
    }

    #[test]
    fn test_json_obj_malformed_is_error() {
        let err = extract_json_obj("answer: { result: unquoted }").unwrap_err();
        assert!(matches!(err, AppError::ParseError(_)));
    }

    #[test]
    fn test_json_obj_spans_first_to_last_bracket() {
        let value = extract_json_obj(r#"x {"a": {"b": 1}} y"#).unwrap().unwrap();
        assert_eq!(value, json!({ "a": { "b": 1 } }));
    }

    #[test]
    fn test_json_array() {
        let completion = "**THOUGHTS**\n...\nRESULT: [\"sektor c\", \"python\"]";
        let tags = extract_json_array(completion).unwrap().unwrap();
        assert_eq!(tags, vec![json!("sektor c"), json!("python")]);
        assert_eq!(extract_json_array("RESULT: none").unwrap(), None);
    }

    #[test]
    fn test_xml_tag() {
        let completion = "Reasoning first.\n<final_answer>\n  hardware \n</final_answer>";
        assert_eq!(
            extract_xml_tag(completion, "final_answer"),
            Some("hardware".to_string())
        );
        assert_eq!(extract_xml_tag("<final_answer>people", "final_answer"), None);
        assert_eq!(extract_xml_tag("people</final_answer>", "final_answer"), None);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_completion_record() {
        use crate::domain::records::ResultObj;

        let record: ResultObj =
            completion_record("<THINKING>...</THINKING>\n{ \"result\": \"2019\" }").unwrap();
        assert_eq!(record.result.as_deref(), Some("2019"));
        assert!(matches!(
            completion_record::<ResultObj>("no object"),
            Err(AppError::ParseError(_))
        ));
        assert!(matches!(
            completion_record::<ResultObj>("{ \"answer\": 1 }"),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn test_require_completion() {
        assert_eq!(require_completion("42".into(), "Answer").unwrap(), "42");
        assert!(require_completion("  ".into(), "Answer").is_err());
    }
}
