//! Canonicalization of the generate-question payload.
//!
//! The backend has shipped at least three shapes for the same answer:
//!
//! 1. a bare string holding the question text;
//! 2. an object whose `question` is a string, metadata beside it;
//! 3. an object whose `question` is a nested object (or that object JSON-encoded
//!    into a string), metadata one level down.
//!
//! This module is the only place allowed to look at those shapes. Everything
//! downstream consumes [`ReflectionQuestion`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared::domain::ReflectionQuestion;
use tracing::debug;

const MAX_NESTING_DEPTH: usize = 4;

const QUESTION_KEY: &str = "question";
const CONCEPTS_KEYS: &[&str] = &["concepts_abordés", "concepts_abordes"];
const DIFFICULTY_KEYS: &[&str] = &["niveau_difficulté", "niveau_difficulte"];
const SKILLS_KEYS: &[&str] = &["compétences_visées", "competences_visees"];
const ELEMENTS_KEYS: &[&str] = &["éléments_réponse", "elements_reponse"];

/// Payload of a generate-question response, before canonicalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawQuestionPayload {
    Text(String),
    Object(Map<String, Value>),
    Other(Value),
}

impl From<Value> for RawQuestionPayload {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            Value::Object(map) => Self::Object(map),
            other => Self::Other(other),
        }
    }
}

impl From<&ReflectionQuestion> for RawQuestionPayload {
    fn from(question: &ReflectionQuestion) -> Self {
        serde_json::to_value(question)
            .map(Self::from)
            .unwrap_or_else(|_| Self::Text(question.text.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireShape {
    PlainText,
    Flat,
    NestedObject,
    NestedEncoded,
    Unrecognized,
}

impl WireShape {
    pub fn as_str(self) -> &'static str {
        match self {
            WireShape::PlainText => "plain_text",
            WireShape::Flat => "flat",
            WireShape::NestedObject => "nested_object",
            WireShape::NestedEncoded => "nested_encoded",
            WireShape::Unrecognized => "unrecognized",
        }
    }
}

/// Metadata layers, innermost first, plus the resolved question text.
struct Unwrapped {
    shape: WireShape,
    text: String,
    layers: Vec<Map<String, Value>>,
}

pub fn classify(raw: &RawQuestionPayload) -> WireShape {
    match raw {
        RawQuestionPayload::Text(_) => WireShape::PlainText,
        RawQuestionPayload::Object(map) => unwrap_layers(map).shape,
        RawQuestionPayload::Other(_) => WireShape::Unrecognized,
    }
}

/// Total: malformed metadata degrades to empty values, never to an error.
/// Question text is trimmed the same way whatever the shape.
pub fn normalize(raw: &RawQuestionPayload) -> ReflectionQuestion {
    match raw {
        RawQuestionPayload::Text(text) => ReflectionQuestion::from_text(text.trim()),
        RawQuestionPayload::Object(map) => {
            let unwrapped = unwrap_layers(map);
            debug!(
                shape = unwrapped.shape.as_str(),
                depth = unwrapped.layers.len(),
                "normalizing question payload"
            );
            ReflectionQuestion {
                text: unwrapped.text.trim().to_string(),
                concepts: lookup(&unwrapped.layers, CONCEPTS_KEYS)
                    .map(string_list)
                    .unwrap_or_default(),
                difficulty: lookup(&unwrapped.layers, DIFFICULTY_KEYS).and_then(scalar_text),
                target_skills: lookup(&unwrapped.layers, SKILLS_KEYS)
                    .map(string_list)
                    .unwrap_or_default(),
                expected_elements: lookup(&unwrapped.layers, ELEMENTS_KEYS)
                    .map(string_list)
                    .unwrap_or_default(),
            }
        }
        RawQuestionPayload::Other(value) => {
            debug!(shape = WireShape::Unrecognized.as_str(), "normalizing question payload");
            ReflectionQuestion::from_text(scalar_text(value).unwrap_or_default())
        }
    }
}

pub fn normalize_value(raw: Value) -> ReflectionQuestion {
    normalize(&RawQuestionPayload::from(raw))
}

fn unwrap_layers(root: &Map<String, Value>) -> Unwrapped {
    let mut layers = vec![root.clone()];
    let mut shape = WireShape::Unrecognized;
    let mut text = String::new();

    for depth in 0..MAX_NESTING_DEPTH {
        let next = match layers.last().and_then(|layer| layer.get(QUESTION_KEY)) {
            Some(Value::String(raw)) => match decode_embedded(raw) {
                Some(inner) => {
                    if depth == 0 {
                        shape = WireShape::NestedEncoded;
                    }
                    inner
                }
                None => {
                    if depth == 0 {
                        shape = WireShape::Flat;
                    }
                    text = raw.clone();
                    break;
                }
            },
            Some(Value::Object(inner)) => {
                if depth == 0 {
                    shape = WireShape::NestedObject;
                }
                inner.clone()
            }
            Some(other) => {
                text = scalar_text(other).unwrap_or_default();
                break;
            }
            None => break,
        };
        layers.push(next);
    }

    layers.reverse();
    Unwrapped {
        shape,
        text,
        layers,
    }
}

/// Object carried as a JSON string inside `question`, if that is what it is.
fn decode_embedded(raw: &str) -> Option<Map<String, Value>> {
    let trimmed = strip_code_fence(raw.trim());
    if !trimmed.starts_with('{') {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) if map.contains_key(QUESTION_KEY) => Some(map),
        _ => None,
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let Some(rest) = raw.strip_prefix("```") else {
        return raw;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// First layer (innermost first) where any alias of the field is present.
fn lookup<'a>(layers: &'a [Map<String, Value>], keys: &[&str]) -> Option<&'a Value> {
    layers.iter().find_map(|layer| {
        keys.iter()
            .filter_map(|key| layer.get(*key))
            .find(|value| !value.is_null())
    })
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        Value::String(_) => scalar_text(value).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
#[path = "tests/payload_tests.rs"]
mod tests;
