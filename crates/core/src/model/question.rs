use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::answer::{AnswerError, AnswerValue};
use crate::model::ids::{OptionId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {0} has an empty prompt")]
    EmptyPrompt(QuestionId),

    #[error("choice question {0} has no options")]
    MissingOptions(QuestionId),

    #[error("question {question} repeats option {option}")]
    DuplicateOption {
        question: QuestionId,
        option: OptionId,
    },

    #[error("question {0} time limit must be > 0")]
    InvalidTimeLimit(QuestionId),

    #[error("question {0} media reference is not a valid URL")]
    InvalidMedia(QuestionId),
}

//
// ─── TYPES ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    MultiChoice,
    ShortText,
    LongText,
}

impl QuestionKind {
    #[must_use]
    pub fn is_choice(self) -> bool {
        matches!(self, QuestionKind::SingleChoice | QuestionKind::MultiChoice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: OptionId,
    pub label: String,
}

impl AnswerOption {
    #[must_use]
    pub fn new(id: OptionId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }
}

/// Unvalidated question as delivered by the authoring system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionDraft {
    pub id: QuestionId,
    pub kind: QuestionKind,
    pub prompt: String,
    pub options: Vec<AnswerOption>,
    pub correct_answer: Option<AnswerValue>,
    pub points: u32,
    pub time_limit_secs: Option<u32>,
    pub media: Option<String>,
}

impl QuestionDraft {
    #[must_use]
    pub fn new(id: QuestionId, kind: QuestionKind, prompt: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            prompt: prompt.into(),
            options: Vec::new(),
            correct_answer: None,
            points: 1,
            time_limit_secs: None,
            media: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: Vec<AnswerOption>) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_time_limit_secs(mut self, secs: u32) -> Self {
        self.time_limit_secs = Some(secs);
        self
    }

    /// Validate the draft into an immutable `Question`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` for empty prompts, missing or repeated options on
    /// choice questions, a zero time limit, or an unparsable media URL.
    pub fn validate(self) -> Result<Question, QuestionError> {
        let prompt = self.prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(QuestionError::EmptyPrompt(self.id));
        }

        if self.kind.is_choice() && self.options.is_empty() {
            return Err(QuestionError::MissingOptions(self.id));
        }

        let mut seen = HashSet::with_capacity(self.options.len());
        for option in &self.options {
            if !seen.insert(option.id) {
                return Err(QuestionError::DuplicateOption {
                    question: self.id,
                    option: option.id,
                });
            }
        }

        if self.time_limit_secs == Some(0) {
            return Err(QuestionError::InvalidTimeLimit(self.id));
        }

        let media = match self.media {
            Some(raw) => Some(
                Url::parse(raw.trim()).map_err(|_| QuestionError::InvalidMedia(self.id))?,
            ),
            None => None,
        };

        // Text questions never render options.
        let options = if self.kind.is_choice() {
            self.options
        } else {
            Vec::new()
        };

        Ok(Question {
            id: self.id,
            kind: self.kind,
            prompt,
            options,
            correct_answer: self.correct_answer,
            points: self.points,
            time_limit_secs: self.time_limit_secs,
            media,
        })
    }
}

/// A validated question. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    kind: QuestionKind,
    prompt: String,
    options: Vec<AnswerOption>,
    correct_answer: Option<AnswerValue>,
    points: u32,
    time_limit_secs: Option<u32>,
    media: Option<Url>,
}

impl Question {
    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Options in authoring order.
    #[must_use]
    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }

    /// Correct-answer reference; opaque to delivery and forwarded to grading only.
    #[must_use]
    pub fn correct_answer(&self) -> Option<&AnswerValue> {
        self.correct_answer.as_ref()
    }

    #[must_use]
    pub fn points(&self) -> u32 {
        self.points
    }

    #[must_use]
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs
            .map(|secs| Duration::from_secs(u64::from(secs)))
    }

    #[must_use]
    pub fn media(&self) -> Option<&Url> {
        self.media.as_ref()
    }

    #[must_use]
    pub fn has_option(&self, id: OptionId) -> bool {
        self.options.iter().any(|option| option.id == id)
    }

    /// Check that `answer` is a well-formed answer for this question.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` if the answer kind does not match the question kind,
    /// references an option that does not exist, repeats an option, or is blank text.
    pub fn check_answer(&self, answer: &AnswerValue) -> Result<(), AnswerError> {
        match (self.kind, answer) {
            (QuestionKind::SingleChoice, AnswerValue::Choice(_))
            | (QuestionKind::MultiChoice, AnswerValue::Choices(_)) => {}
            (QuestionKind::ShortText | QuestionKind::LongText, AnswerValue::Text(text)) => {
                if text.trim().is_empty() {
                    return Err(AnswerError::EmptyText);
                }
                return Ok(());
            }
            _ => return Err(AnswerError::KindMismatch { question: self.id }),
        }

        let mut seen = HashSet::new();
        for option in answer.option_ids() {
            if !self.has_option(*option) {
                return Err(AnswerError::UnknownOption {
                    question: self.id,
                    option: *option,
                });
            }
            if !seen.insert(*option) {
                return Err(AnswerError::DuplicateOption { option: *option });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(ids: &[u64]) -> Vec<AnswerOption> {
        ids.iter()
            .map(|id| AnswerOption::new(OptionId::new(*id), format!("Option {id}")))
            .collect()
    }

    fn single_choice() -> Question {
        QuestionDraft::new(QuestionId::new(1), QuestionKind::SingleChoice, "Pick one")
            .with_options(options(&[10, 11, 12]))
            .validate()
            .unwrap()
    }

    #[test]
    fn choice_question_requires_options() {
        let err = QuestionDraft::new(QuestionId::new(1), QuestionKind::MultiChoice, "Pick")
            .validate()
            .unwrap_err();
        assert_eq!(err, QuestionError::MissingOptions(QuestionId::new(1)));
    }

    #[test]
    fn duplicate_option_ids_are_rejected() {
        let err = QuestionDraft::new(QuestionId::new(2), QuestionKind::SingleChoice, "Pick")
            .with_options(options(&[1, 1]))
            .validate()
            .unwrap_err();
        assert!(matches!(err, QuestionError::DuplicateOption { .. }));
    }

    #[test]
    fn zero_time_limit_is_rejected() {
        let err = QuestionDraft::new(QuestionId::new(3), QuestionKind::ShortText, "Say")
            .with_time_limit_secs(0)
            .validate()
            .unwrap_err();
        assert_eq!(err, QuestionError::InvalidTimeLimit(QuestionId::new(3)));
    }

    #[test]
    fn text_question_drops_stray_options() {
        let question = QuestionDraft::new(QuestionId::new(4), QuestionKind::LongText, " Explain ")
            .with_options(options(&[1]))
            .validate()
            .unwrap();
        assert!(question.options().is_empty());
        assert_eq!(question.prompt(), "Explain");
    }

    #[test]
    fn invalid_media_is_rejected() {
        let mut draft = QuestionDraft::new(QuestionId::new(5), QuestionKind::ShortText, "Look");
        draft.media = Some("not a url".into());
        assert_eq!(
            draft.validate().unwrap_err(),
            QuestionError::InvalidMedia(QuestionId::new(5))
        );
    }

    #[test]
    fn check_answer_accepts_known_option() {
        let question = single_choice();
        assert!(question
            .check_answer(&AnswerValue::Choice(OptionId::new(11)))
            .is_ok());
    }

    #[test]
    fn check_answer_rejects_unknown_option_and_wrong_kind() {
        let question = single_choice();
        assert!(matches!(
            question.check_answer(&AnswerValue::Choice(OptionId::new(99))),
            Err(AnswerError::UnknownOption { .. })
        ));
        assert!(matches!(
            question.check_answer(&AnswerValue::Text("hi".into())),
            Err(AnswerError::KindMismatch { .. })
        ));
    }

    #[test]
    fn check_answer_rejects_repeated_choices() {
        let question = QuestionDraft::new(QuestionId::new(6), QuestionKind::MultiChoice, "Pick")
            .with_options(options(&[1, 2]))
            .validate()
            .unwrap();
        let err = question
            .check_answer(&AnswerValue::Choices(vec![OptionId::new(1), OptionId::new(1)]))
            .unwrap_err();
        assert_eq!(err, AnswerError::DuplicateOption { option: OptionId::new(1) });
    }

    #[test]
    fn blank_text_answer_is_rejected() {
        let question = QuestionDraft::new(QuestionId::new(7), QuestionKind::ShortText, "Say")
            .validate()
            .unwrap();
        assert_eq!(
            question.check_answer(&AnswerValue::Text("   ".into())),
            Err(AnswerError::EmptyText)
        );
    }
}
