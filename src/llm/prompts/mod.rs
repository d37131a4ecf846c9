//! Prompt templates and the JSON contracts the model is asked to honour.


use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::chat::ChatContext;

/// Catalog entries extracted from one raw document
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ExtractedCatalog {
    #[serde(default)]
    pub universities: Vec<ExtractedEntry>,
}

/// One university, optionally paired with one of its courses
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ExtractedEntry {
    #[serde(deserialize_with = "null_as_empty")]
    pub university_name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub university_description: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub country: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub course_name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub degree_type: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub starting_date: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub duration: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub scholarship: String,
    pub fee_structure: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub language_of_study: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub field_of_study: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentTarget {
    University,
    Course,
    Both,
    #[default]
    #[serde(other)]
    Unknown,
}

impl IntentTarget {
    #[inline]
    pub fn wants_universities(self) -> bool {
        matches!(self, IntentTarget::University | IntentTarget::Both)
    }

    #[inline]
    pub fn wants_courses(self) -> bool {
        matches!(self, IntentTarget::Course | IntentTarget::Both)
    }
}

/// How the assistant should route a user query
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct QueryIntent {
    #[serde(default)]
    pub requires_lookup: bool,
    #[serde(default)]
    pub target: IntentTarget,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub reason: String,
}

impl QueryIntent {
    /// Used when classification fails: answer directly, no lookup
    #[inline]
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            requires_lookup: false,
            target: IntentTarget::Unknown,
            reason: reason.into(),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    })
}

#[inline]
pub fn extraction_prompt(content: &str) -> String {
    format!(
        r#"You extract structured university and course information from raw text.

Return a single JSON object with this shape and nothing else:
{{
  "universities": [
    {{
      "university_name": "official university name",
      "university_description": "short description of the university",
      "country": "country where the university is located",
      "course_name": "name of the course or programme, empty if none",
      "description": "description of the course",
      "degree_type": "e.g. Bachelor, Master, PhD",
      "starting_date": "intake or start date",
      "duration": "programme length",
      "scholarship": "scholarship information",
      "fee_structure": "tuition fees, or null when not stated",
      "language_of_study": "language of instruction",
      "field_of_study": "subject area"
    }}
  ]
}}

Emit one entry per course. A university with no course information gets a
single entry with an empty "course_name". Use empty strings for unknown text
fields and never invent facts that are not in the text.

Text:
{content}"#
    )
}

#[inline]
pub fn intent_prompt(query: &str) -> String {
    format!(
        r#"Classify the user's question about universities and courses.

Return a single JSON object:
{{"requires_lookup": true or false, "target": "university" | "course" | "both" | "unknown", "reason": "one short sentence"}}

Set "requires_lookup" to true when answering needs facts from the catalog of
universities and courses. Greetings, small talk and general advice do not.

Question: {query}"#
    )
}

#[inline]
pub fn answer_prompt(query: &str, context: Option<&ChatContext>) -> String {
    match context.filter(|c| !c.is_empty()) {
        Some(context) => format!(
            r#"You are a helpful assistant for prospective students.
Answer the question using the catalog records below. If the records do not
contain the answer, say so plainly instead of guessing.

{context}
Question: {query}"#
        ),
        None => format!(
            r#"You are a helpful assistant for prospective students.
Answer the question concisely. If it asks for specific university or course
facts you do not know, say that you could not find matching records.

Question: {query}"#
        ),
    }
}

/// Parse a JSON object out of a model reply.
///
/// Tolerates markdown code fences and prose before or after the object.
#[inline]
pub fn parse_json_reply<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let trimmed = strip_code_fence(raw.trim());

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let start = trimmed
        .find('{')
        .ok_or_else(|| anyhow::anyhow!("Model reply contains no JSON object"))?;
    let end = trimmed
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| anyhow::anyhow!("Model reply contains an unterminated JSON object"))?;

    let object = trimmed
        .get(start..=end)
        .ok_or_else(|| anyhow::anyhow!("Model reply JSON bounds are not on char boundaries"))?;
    serde_json::from_str(object).context("Failed to parse JSON from model reply")
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the language tag line, e.g. ```json
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}
