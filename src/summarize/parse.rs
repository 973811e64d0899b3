//! Lenient parsing of model output into feature records.
//!
//! Models wrap JSON in prose or code fences, add trailing commas, and use
//! smart quotes. Each response is turned into a short list of candidate
//! fragments and the first one that deserializes wins.

use crate::clustering::{Confidence, FeatureType};
use crate::error::LlmError;
use crate::util::truncate_str;
use serde::de::DeserializeOwned;
use serde::Deserialize;

const MAX_CANDIDATES: usize = 8;

/// One feature as the model describes it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeatureJson {
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub confidence: String,
}

impl FeatureJson {
    /// Unrecognised types read as enhancement.
    pub fn feature_type(&self) -> FeatureType {
        FeatureType::parse(&self.kind).unwrap_or(FeatureType::Enhancement)
    }

    /// Unrecognised confidence reads as low.
    pub fn confidence(&self) -> Confidence {
        Confidence::parse(&self.confidence).unwrap_or(Confidence::Low)
    }
}

/// Accept `"id": "a/b#1"` as well as a bare number.
fn id_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BatchPayload {
    List(Vec<FeatureJson>),
    Wrapped { features: Vec<FeatureJson> },
    Results { results: Vec<FeatureJson> },
}

impl BatchPayload {
    fn into_features(self) -> Vec<FeatureJson> {
        match self {
            BatchPayload::List(features)
            | BatchPayload::Wrapped { features }
            | BatchPayload::Results { results: features } => features,
        }
    }
}

pub fn parse_feature(content: &str) -> Result<FeatureJson, LlmError> {
    parse_structured(content)
}

pub fn parse_batch(content: &str) -> Result<Vec<FeatureJson>, LlmError> {
    parse_structured::<BatchPayload>(content).map(BatchPayload::into_features)
}

fn parse_structured<T: DeserializeOwned>(content: &str) -> Result<T, LlmError> {
    if content.trim().is_empty() {
        return Err(LlmError::Empty);
    }

    let mut candidates: Vec<String> = Vec::new();
    push_unique(&mut candidates, content.trim().to_string());
    if let Some(stripped) = strip_markdown_fences(content) {
        push_unique(&mut candidates, stripped);
    }

    let mut idx = 0;
    while idx < candidates.len() && candidates.len() < MAX_CANDIDATES {
        let current = candidates[idx].clone();
        for extracted in extract_json_candidates(&current, 4) {
            push_unique(&mut candidates, extracted);
        }
        idx += 1;
    }

    let mut first_error = None;
    for candidate in &candidates {
        for attempt in [candidate.clone(), fix_json_issues(candidate)] {
            match serde_json::from_str::<T>(&attempt) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    first_error.get_or_insert(e.to_string());
                }
            }
        }
    }

    Err(LlmError::Parse(format!(
        "{} (response preview: {})",
        first_error.unwrap_or_default(),
        truncate_str(content.trim(), 200)
    )))
}

fn push_unique(candidates: &mut Vec<String>, candidate: String) {
    if !candidate.is_empty() && !candidates.contains(&candidate) {
        candidates.push(candidate);
    }
}

fn strip_markdown_fences(content: &str) -> Option<String> {
    let trimmed = content.trim();
    let start = trimmed.find("```")?;
    let without_open = &trimmed[start + 3..];
    // Skip the language tag line, if any
    let body = match without_open.find('\n') {
        Some(newline_idx) => &without_open[newline_idx + 1..],
        None => without_open,
    };
    let end_idx = body.rfind("```")?;
    Some(body[..end_idx].trim().to_string())
}

/// The balanced `{...}` or `[...]` starting at byte `start`, honoring strings.
fn extract_balanced_json_from(content: &str, start: usize) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    let end = start + offset + ch.len_utf8();
                    return Some(content[start..end].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn extract_json_candidates(content: &str, max_candidates: usize) -> Vec<String> {
    let mut out = Vec::new();
    for (idx, ch) in content.char_indices() {
        if out.len() >= max_candidates {
            break;
        }
        if ch == '{' || ch == '[' {
            if let Some(candidate) = extract_balanced_json_from(content, idx) {
                push_unique(&mut out, candidate);
            }
        }
    }
    out
}

fn fix_json_issues(json: &str) -> String {
    json.replace(",]", "]")
        .replace(",}", "}")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_plain_object() {
        let parsed = parse_feature(
            r#"{"title": "Dark mode", "description": "Adds a theme switch", "type": "feature", "confidence": "high"}"#,
        )
        .unwrap();
        assert_eq!(parsed.title, "Dark mode");
        assert_eq!(parsed.feature_type(), FeatureType::Feature);
        assert_eq!(parsed.confidence(), Confidence::High);
    }

    #[test]
    fn test_parse_fenced_object_with_prose() {
        let content = "Here is the summary:\n```json\n{\"title\": \"Export\", \"type\": \"bugfix\", \"confidence\": \"medium\",}\n```\nHope that helps!";
        let parsed = parse_feature(content).unwrap();
        assert_eq!(parsed.title, "Export");
        assert_eq!(parsed.feature_type(), FeatureType::Bugfix);
        assert_eq!(parsed.description, "");
    }

    #[test]
    fn test_unknown_labels_degrade() {
        let parsed =
            parse_feature(r#"{"title": "X", "type": "epic", "confidence": "certain"}"#).unwrap();
        assert_eq!(parsed.feature_type(), FeatureType::Enhancement);
        assert_eq!(parsed.confidence(), Confidence::Low);
    }

    #[test]
    fn test_braces_inside_strings() {
        let content = r#"Result: {"title": "Handle {placeholders}", "type": "feature"} trailing"#;
        assert_eq!(parse_feature(content).unwrap().title, "Handle {placeholders}");
    }

    #[test]
    fn test_parse_batch_shapes() {
        let list = r#"[{"id": "a/b#1", "title": "One"}, {"id": 2, "title": "Two"}]"#;
        let parsed = parse_batch(list).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].id.as_deref(), Some("a/b#1"));
        assert_eq!(parsed[1].id.as_deref(), Some("2"));

        let wrapped = r#"{"features": [{"id": "a/b#1", "title": "One"}]}"#;
        assert_eq!(parse_batch(wrapped).unwrap().len(), 1);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse_feature("   "), Err(LlmError::Empty)));
        assert!(matches!(
            parse_feature("I could not summarize this."),
            Err(LlmError::Parse(_))
        ));
    }
}
