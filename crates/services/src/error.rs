//! Shared error types for the services crate.

use std::time::Duration;

use gateway::ApiError;
use proctor_core::model::{AnswerError, AssessmentError, SessionStateError};
use thiserror::Error;

const LOAD_REDIRECT_DELAY: Duration = Duration::from_secs(3);

/// Errors emitted by `AssessmentLoader`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadError {
    #[error("could not load assessment: {0}")]
    Fetch(#[source] ApiError),
    #[error("assessment is not valid: {0}")]
    Invalid(#[from] AssessmentError),
}

impl LoadError {
    /// How long a host should show the failure before sending the learner back.
    #[must_use]
    pub fn redirect_delay(&self) -> Duration {
        LOAD_REDIRECT_DELAY
    }
}

/// Errors emitted by `SubmissionFinalizer`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmissionError {
    #[error("a submission is already in flight")]
    InFlight,
    #[error("session was already submitted")]
    AlreadySubmitted,
    #[error("session has not started")]
    NotStarted,
    #[error("submission was not accepted: {0}")]
    Rejected(#[source] ApiError),
}

impl SubmissionError {
    /// True when `retry_submit` has a chance of succeeding.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmissionError::Rejected(_))
    }
}

/// Errors emitted by `SessionController`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no question is being shown")]
    NoCurrentQuestion,
    #[error("session was abandoned before it was submitted")]
    Abandoned,
    #[error(transparent)]
    State(#[from] SessionStateError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Assessment(#[from] AssessmentError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

/// Errors emitted by `Lobby`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LobbyError {
    #[error("assessment is not attached to a live session")]
    NotLive,
    #[error("could not join live session: {0}")]
    Join(#[source] ApiError),
    #[error("stopped waiting for the live session")]
    Cancelled,
}

/// Errors emitted by `HandoffSlot`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HandoffError {
    #[error("handoff slot already holds a value")]
    Occupied,
}

/// Errors emitted while reading service configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{var} must be a positive number of milliseconds, got {raw:?}")]
    InvalidInterval { var: &'static str, raw: String },
}
