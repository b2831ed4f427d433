//! Multiple-choice question records
//!
//! Question content is validated once, in [`QuestionDraft::new`]; a `Question` can only
//! be built from a draft, so no persisted question can violate the option or answer bounds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 4;

/// Why a question could not be constructed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestionError {
    #[error("question text is empty")]
    EmptyText,

    #[error("expected 2-4 options, got {0}")]
    OptionCount(usize),

    #[error("option {0} is empty")]
    EmptyOption(usize),

    #[error("correct answer {answer} out of range for {options} options")]
    AnswerOutOfRange { answer: usize, options: usize },
}

/// Validated question content, before it is attached to a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDraft {
    question: String,
    options: Vec<String>,
    correct_answer: usize,
    explanation: String,
    order: u32,
}

impl QuestionDraft {
    pub fn new(
        question: String,
        options: Vec<String>,
        correct_answer: usize,
        explanation: String,
        order: u32,
    ) -> Result<Self, QuestionError> {
        if question.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&options.len()) {
            return Err(QuestionError::OptionCount(options.len()));
        }
        if let Some(pos) = options.iter().position(|o| o.trim().is_empty()) {
            return Err(QuestionError::EmptyOption(pos));
        }
        if correct_answer >= options.len() {
            return Err(QuestionError::AnswerOutOfRange {
                answer: correct_answer,
                options: options.len(),
            });
        }

        Ok(Self {
            question,
            options,
            correct_answer,
            explanation,
            order,
        })
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn correct_answer(&self) -> usize {
        self.correct_answer
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn order(&self) -> u32 {
        self.order
    }
}

/// Persisted question
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub segment_id: Uuid,
    pub video_id: Uuid,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    pub explanation: String,
    pub order: u32,
    pub created_at: DateTime<Utc>,
}

impl Question {
    /// Attach a validated draft to its segment
    pub fn new(segment_id: Uuid, video_id: Uuid, draft: QuestionDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            segment_id,
            video_id,
            question: draft.question,
            options: draft.options,
            correct_answer: draft.correct_answer,
            explanation: draft.explanation,
            order: draft.order,
            created_at: Utc::now(),
        }
    }
}
