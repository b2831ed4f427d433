//! Question normalization
//!
//! Converts the loosely-shaped candidates returned by the generation endpoint into
//! validated [`QuestionDraft`]s. Models disagree on key casing and sometimes encode
//! nested values as strings, so each field is resolved through a fixed alias table
//! and decoded into a tagged variant before any coercion happens.
//!
//! **Rules per candidate:**
//! 1. Non-object candidates are dropped
//! 2. Options are trimmed, blanks dropped, non-string scalars stringified, capped at 4
//! 3. Fewer than 2 usable options → `["True", "False"]`
//! 4. `correctAnswer` coerced to an integer (absent/unparseable → 0), clamped into range
//! 5. Candidates with empty question text are dropped
//!
//! Zero surviving candidates is a valid outcome.

use crate::models::{QuestionDraft, MAX_OPTIONS, MIN_OPTIONS};
use serde_json::{Map, Value};

const QUESTION_KEYS: &[&str] = &["question", "Question"];
const OPTIONS_KEYS: &[&str] = &["options", "Options"];
const ANSWER_KEYS: &[&str] = &["correctAnswer", "correct_answer", "CorrectAnswer"];
const EXPLANATION_KEYS: &[&str] = &["explanation", "Explanation"];

const FALLBACK_OPTIONS: [&str; 2] = ["True", "False"];

/// Raw `options` value as found on a candidate
#[derive(Debug, Clone, PartialEq)]
enum OptionsField {
    List(Vec<Value>),
    /// JSON-encoded list, or a lone option
    Encoded(String),
    Missing,
}

impl OptionsField {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Array(items)) => OptionsField::List(items.clone()),
            Some(Value::String(s)) => OptionsField::Encoded(s.clone()),
            _ => OptionsField::Missing,
        }
    }

    /// Usable option strings, before fallback substitution
    fn into_options(self) -> Vec<String> {
        let items = match self {
            OptionsField::List(items) => items,
            OptionsField::Encoded(encoded) => match serde_json::from_str::<Value>(&encoded) {
                Ok(Value::Array(items)) => items,
                _ => vec![Value::String(encoded)],
            },
            OptionsField::Missing => Vec::new(),
        };

        items
            .iter()
            .filter_map(option_text)
            .filter(|s| !s.is_empty())
            .take(MAX_OPTIONS)
            .collect()
    }
}

/// Raw `correctAnswer` value as found on a candidate
#[derive(Debug, Clone, PartialEq)]
enum AnswerField {
    Number(f64),
    Text(String),
    Missing,
}

impl AnswerField {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) => n.as_f64().map_or(AnswerField::Missing, AnswerField::Number),
            Some(Value::String(s)) => AnswerField::Text(s.clone()),
            _ => AnswerField::Missing,
        }
    }

    /// Integer index; fractions truncate, negatives and garbage become 0
    fn to_index(&self) -> usize {
        let raw = match self {
            AnswerField::Number(n) => *n,
            AnswerField::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            AnswerField::Missing => 0.0,
        };
        if raw.is_finite() && raw > 0.0 {
            raw.trunc() as usize
        } else {
            0
        }
    }
}

fn option_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> String {
    match lookup(obj, keys) {
        Some(Value::String(s)) => s.trim().to_string(),
        _ => String::new(),
    }
}

/// Normalize raw candidates; `order` is the position among emitted drafts
pub fn normalize_candidates(candidates: &[Value]) -> Vec<QuestionDraft> {
    let mut drafts = Vec::with_capacity(candidates.len());

    for (position, candidate) in candidates.iter().enumerate() {
        let Some(obj) = candidate.as_object() else {
            tracing::debug!(position, "Dropping non-object question candidate");
            continue;
        };

        let question = text_field(obj, QUESTION_KEYS);
        if question.is_empty() {
            tracing::debug!(position, "Dropping question candidate without text");
            continue;
        }

        let mut options = OptionsField::from_value(lookup(obj, OPTIONS_KEYS)).into_options();
        if options.len() < MIN_OPTIONS {
            options = FALLBACK_OPTIONS.iter().map(|s| s.to_string()).collect();
        }

        let correct_answer = AnswerField::from_value(lookup(obj, ANSWER_KEYS))
            .to_index()
            .min(options.len() - 1);

        let explanation = text_field(obj, EXPLANATION_KEYS);

        match QuestionDraft::new(
            question,
            options,
            correct_answer,
            explanation,
            drafts.len() as u32,
        ) {
            Ok(draft) => drafts.push(draft),
            Err(e) => tracing::warn!(position, error = %e, "Normalized candidate still invalid"),
        }
    }

    drafts
}
