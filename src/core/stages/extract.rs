use serde_json::{Map, Value};

pub const PREVIEW_CHARS: usize = 500;
pub const WARNINGS_KEY: &str = "_warnings";

const FENCE: &str = "```";
const JSON_FENCE: &str = "```json";

/// Locates the JSON body inside model output.
///
/// The first ```json block wins, then the first fenced block of any kind, then the
/// whole text. Prose outside the chosen block is dropped.
pub fn json_body(raw: &str) -> &str {
    if let Some(start) = raw.find(JSON_FENCE) {
        return until_fence(&raw[start + JSON_FENCE.len()..]).trim();
    }
    if let Some(start) = raw.find(FENCE) {
        let inner = skip_info_string(&raw[start + FENCE.len()..]);
        return until_fence(inner).trim();
    }
    raw.trim()
}

fn until_fence(s: &str) -> &str {
    match s.find(FENCE) {
        Some(end) => &s[..end],
        None => s,
    }
}

// ```yaml, ```text ... the tag line is not part of the body.
fn skip_info_string(s: &str) -> &str {
    match s.find('\n') {
        Some(nl) if !s[..nl].trim_start().starts_with(['{', '[']) => &s[nl + 1..],
        _ => s,
    }
}

/// Parses model output into a JSON object. Failure is data, not an error.
pub fn extract_json(raw: &str) -> Value {
    match serde_json::from_str::<Value>(json_body(raw)) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => parse_failure(
            raw,
            &format!("expected a JSON object, found {}", kind_of(&other)),
        ),
        Err(e) => parse_failure(raw, &e.to_string()),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_failure(raw: &str, message: &str) -> Value {
    let preview: String = raw.chars().take(PREVIEW_CHARS).collect();
    let mut out = Map::new();
    out.insert("error".into(), Value::String("JSON parsing failed".into()));
    out.insert("raw_output_preview".into(), Value::String(preview));
    out.insert("parse_error".into(), Value::String(message.to_string()));
    Value::Object(out)
}

pub fn is_parse_failure(output: &Value) -> bool {
    output.get("parse_error").is_some() && output.get("error").is_some()
}

/// Records absent top-level keys under `_warnings` and returns them.
pub fn flag_missing_fields(output: &mut Value, required: &[&str]) -> Vec<String> {
    let Some(map) = output.as_object_mut() else {
        return required.iter().map(|s| s.to_string()).collect();
    };
    let missing: Vec<String> = required
        .iter()
        .filter(|key| !map.contains_key(**key))
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        map.insert(
            WARNINGS_KEY.into(),
            Value::String(format!("Missing sections: {}", missing.join(", "))),
        );
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_json_block_wins_over_surrounding_prose() {
        let block = "{\"market_size\": {\"tam\": 1000}}";
        let raw = format!("Here is the analysis:\n```json\n{block}\n```\nLet me know if you need more.");
        assert_eq!(extract_json(&raw), extract_json(block));
        assert_eq!(extract_json(&raw)["market_size"]["tam"], 1000);
    }

    #[test]
    fn json_tagged_block_is_preferred_over_earlier_plain_block() {
        let raw = "```\nnot json\n```\nthen\n```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(raw), json!({"a": 1}));
    }

    #[test]
    fn first_json_block_is_used_when_several_exist() {
        let raw = "```json\n{\"first\": true}\n```\n```json\n{\"second\": true}\n```";
        assert_eq!(extract_json(raw), json!({"first": true}));
    }

    #[test]
    fn generic_fence_drops_its_tag_line() {
        let raw = "```javascript\n{\"a\": 2}\n```";
        assert_eq!(extract_json(raw), json!({"a": 2}));
        let untagged = "```\n{\"a\": 3}\n```";
        assert_eq!(extract_json(untagged), json!({"a": 3}));
    }

    #[test]
    fn bare_json_is_parsed_whole() {
        assert_eq!(extract_json("  {\"x\": [1, 2]}\n"), json!({"x": [1, 2]}));
    }

    #[test]
    fn extraction_is_idempotent() {
        let raw = "prefix ```json\n{\"k\": \"v\"}\n``` suffix";
        let once = extract_json(raw);
        let twice = extract_json(&once.to_string());
        assert_eq!(once, twice);
    }

    #[test]
    fn unparseable_output_becomes_error_structure() {
        let raw = "I cannot produce JSON today.".repeat(40);
        let out = extract_json(&raw);
        assert!(is_parse_failure(&out));
        assert_eq!(out["error"], "JSON parsing failed");
        assert_eq!(
            out["raw_output_preview"].as_str().unwrap().chars().count(),
            PREVIEW_CHARS
        );
        assert!(!out["parse_error"].as_str().unwrap().is_empty());
    }

    #[test]
    fn non_object_json_is_a_parse_failure() {
        let out = extract_json("[1, 2, 3]");
        assert!(is_parse_failure(&out));
        assert!(out["parse_error"].as_str().unwrap().contains("array"));
    }

    #[test]
    fn missing_fields_are_recorded_as_warnings() {
        let mut out = json!({"technical_feasibility": {}, "validation_metrics": {}});
        let missing = flag_missing_fields(
            &mut out,
            &["technical_feasibility", "risk_assessment", "recommendation"],
        );
        assert_eq!(missing, vec!["risk_assessment", "recommendation"]);
        assert_eq!(
            out[WARNINGS_KEY],
            "Missing sections: risk_assessment, recommendation"
        );
    }

    #[test]
    fn complete_output_has_no_warnings() {
        let mut out = json!({"a": 1, "b": 2});
        assert!(flag_missing_fields(&mut out, &["a", "b"]).is_empty());
        assert!(out.get(WARNINGS_KEY).is_none());
    }
}
