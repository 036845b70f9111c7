use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::answer::AnswerValue;
use crate::model::ids::QuestionId;
use crate::time::millis_between;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("a session needs at least one question")]
    NoQuestions,

    #[error("cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("session is not active (status: {0:?})")]
    NotActive(SessionStatus),

    #[error("moving back is not allowed here")]
    CannotMoveBack,
}

//
// ─── LIFECYCLE ─────────────────────────────────────────────────────────────────
//

/// Lifecycle of a learner session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Active,
    Submitting,
    /// The last submit attempt failed; answers are kept and a manual retry is possible.
    SubmitFailed,
    Finished,
}

impl SessionStatus {
    /// Transition table for the session lifecycle.
    #[must_use]
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::{Active, Finished, SubmitFailed, Submitting, Waiting};
        matches!(
            (self, next),
            (Waiting, Active)
                | (Active, Submitting)
                | (Submitting, Finished)
                | (Submitting, SubmitFailed)
                | (SubmitFailed, Submitting)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == SessionStatus::Finished
    }
}

/// Position within the display sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "at", content = "index")]
pub enum Cursor {
    Waiting,
    At(usize),
    End,
}

impl Cursor {
    /// Index in the `-1 ..= total` convention used on the wire:
    /// `-1` before start, `total` once every question was passed.
    #[must_use]
    pub fn wire_index(self, total: usize) -> i64 {
        match self {
            Cursor::Waiting => -1,
            Cursor::At(index) => i64::try_from(index).unwrap_or(i64::MAX),
            Cursor::End => i64::try_from(total).unwrap_or(i64::MAX),
        }
    }

    #[must_use]
    pub fn index(self) -> Option<usize> {
        match self {
            Cursor::At(index) => Some(index),
            Cursor::Waiting | Cursor::End => None,
        }
    }
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Mutable state of one learner session.
///
/// The focus-loss count is derived from the log plus the open away interval,
/// so it can never drift from the recorded durations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    total: usize,
    allow_backtrack: bool,
    cursor: Cursor,
    status: SessionStatus,
    started_at: Option<DateTime<Utc>>,
    answers: BTreeMap<QuestionId, AnswerValue>,
    answer_committed: bool,
    focus_loss_log: Vec<u64>,
    away_since: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Create a waiting session over `total` questions.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NoQuestions` when `total` is zero.
    pub fn new(total: usize, allow_backtrack: bool) -> Result<Self, SessionStateError> {
        if total == 0 {
            return Err(SessionStateError::NoQuestions);
        }
        Ok(Self {
            total,
            allow_backtrack,
            cursor: Cursor::Waiting,
            status: SessionStatus::Waiting,
            started_at: None,
            answers: BTreeMap::new(),
            answer_committed: false,
            focus_loss_log: Vec::new(),
            away_since: None,
        })
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, AnswerValue> {
        &self.answers
    }

    #[must_use]
    pub fn answer_for(&self, question: QuestionId) -> Option<&AnswerValue> {
        self.answers.get(&question)
    }

    /// True once an answer was recorded for the current question.
    #[must_use]
    pub fn answer_committed(&self) -> bool {
        self.answer_committed
    }

    /// Move along the lifecycle.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidTransition` when the table forbids the move.
    pub fn transition(&mut self, next: SessionStatus) -> Result<(), SessionStateError> {
        if !self.status.can_transition_to(next) {
            return Err(SessionStateError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Waiting → Active, positioned on the first question.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidTransition` unless the session is waiting.
    pub fn start(&mut self, at: DateTime<Utc>) -> Result<(), SessionStateError> {
        self.transition(SessionStatus::Active)?;
        self.started_at = Some(at);
        self.cursor = Cursor::At(0);
        self.answer_committed = false;
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), SessionStateError> {
        if self.status == SessionStatus::Active {
            Ok(())
        } else {
            Err(SessionStateError::NotActive(self.status))
        }
    }

    /// Step forward by exactly one position; the last step lands on `Cursor::End`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NotActive` unless the session is active and on a question.
    pub fn advance(&mut self) -> Result<Cursor, SessionStateError> {
        self.ensure_active()?;
        let Cursor::At(index) = self.cursor else {
            return Err(SessionStateError::NotActive(self.status));
        };
        let next = index + 1;
        self.cursor = if next >= self.total {
            Cursor::End
        } else {
            Cursor::At(next)
        };
        self.answer_committed = false;
        Ok(self.cursor)
    }

    /// Step back one question. Only possible when backtracking is allowed.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::CannotMoveBack` without backtracking or on the first question.
    pub fn retreat(&mut self) -> Result<Cursor, SessionStateError> {
        self.ensure_active()?;
        match self.cursor {
            Cursor::At(index) if self.allow_backtrack && index > 0 => {
                self.cursor = Cursor::At(index - 1);
                self.answer_committed = false;
                Ok(self.cursor)
            }
            _ => Err(SessionStateError::CannotMoveBack),
        }
    }

    /// Record or replace the answer for `question`. Answers are never removed.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NotActive` outside the active phase.
    pub fn record_answer(
        &mut self,
        question: QuestionId,
        answer: AnswerValue,
    ) -> Result<Option<AnswerValue>, SessionStateError> {
        self.ensure_active()?;
        self.answer_committed = true;
        Ok(self.answers.insert(question, answer))
    }

    //
    // ─── FOCUS LOSS ───────────────────────────────────────────────────────────
    //

    /// Open an away interval. Returns false if one is already open.
    pub fn mark_away(&mut self, at: DateTime<Utc>) -> bool {
        if self.away_since.is_some() {
            return false;
        }
        self.away_since = Some(at);
        true
    }

    /// Close the open away interval and log its duration in milliseconds.
    pub fn mark_returned(&mut self, at: DateTime<Utc>) -> Option<u64> {
        let since = self.away_since.take()?;
        let duration = millis_between(since, at);
        self.focus_loss_log.push(duration);
        Some(duration)
    }

    #[must_use]
    pub fn is_away(&self) -> bool {
        self.away_since.is_some()
    }

    #[must_use]
    pub fn away_since(&self) -> Option<DateTime<Utc>> {
        self.away_since
    }

    #[must_use]
    pub fn focus_loss_count(&self) -> usize {
        self.focus_loss_log.len() + usize::from(self.away_since.is_some())
    }

    /// Completed away intervals in milliseconds, oldest first.
    #[must_use]
    pub fn focus_loss_log(&self) -> &[u64] {
        &self.focus_loss_log
    }

    #[must_use]
    pub fn total_away_ms(&self) -> u64 {
        self.focus_loss_log.iter().sum()
    }
}
