use thiserror::Error;

use crate::model::{AnswerError, AssessmentError, QuestionError, SessionStateError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Assessment(#[from] AssessmentError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    SessionState(#[from] SessionStateError),
}
