use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{OptionId, QuestionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("answer kind does not match question {question}")]
    KindMismatch { question: QuestionId },

    #[error("option {option} does not belong to question {question}")]
    UnknownOption {
        question: QuestionId,
        option: OptionId,
    },

    #[error("option {option} selected more than once")]
    DuplicateOption { option: OptionId },

    #[error("answer text cannot be empty")]
    EmptyText,
}

/// A learner's answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    /// Single-choice selection.
    Choice(OptionId),
    /// Multi-choice selection, in the order the learner picked them.
    Choices(Vec<OptionId>),
    /// Short or long free text.
    Text(String),
}

impl AnswerValue {
    /// Option ids referenced by this answer; empty for text answers.
    #[must_use]
    pub fn option_ids(&self) -> &[OptionId] {
        match self {
            AnswerValue::Choice(id) => std::slice::from_ref(id),
            AnswerValue::Choices(ids) => ids,
            AnswerValue::Text(_) => &[],
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_ids_cover_every_variant() {
        assert_eq!(
            AnswerValue::Choice(OptionId::new(3)).option_ids(),
            &[OptionId::new(3)]
        );
        assert_eq!(
            AnswerValue::Choices(vec![OptionId::new(1), OptionId::new(2)]).option_ids(),
            &[OptionId::new(1), OptionId::new(2)]
        );
        assert!(AnswerValue::Text("x".into()).option_ids().is_empty());
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(AnswerValue::Choice(OptionId::new(4))).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "choice", "value": 4 }));
    }
}
