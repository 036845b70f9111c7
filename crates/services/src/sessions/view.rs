use proctor_core::model::{OptionId, QuestionId, SessionStatus, SubmissionId};
use serde::Serialize;

use super::progress::SessionProgress;
use crate::lockdown::GuardState;

/// Snapshot of a session for rendering, published on every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub status: SessionStatus,
    /// Display position of the current question.
    pub position: Option<usize>,
    /// Position as reported to observers: `-1` waiting, `total` past the end.
    pub current_index: i64,
    pub question_id: Option<QuestionId>,
    /// Option ids of the current question in display order.
    pub options: Vec<OptionId>,
    pub progress: SessionProgress,
    pub show_progress: bool,
    pub global_remaining_secs: Option<u64>,
    pub question_remaining_secs: Option<u64>,
    pub focus_loss_count: usize,
    pub is_away: bool,
    pub lockdown: GuardState,
    pub last_error: Option<String>,
    pub submission_id: Option<SubmissionId>,
}

impl SessionView {
    /// "Question 2 of 5", or `None` outside a question.
    #[must_use]
    pub fn position_label(&self) -> Option<String> {
        self.position
            .map(|position| format!("Question {} of {}", position + 1, self.progress.total))
    }

    /// `mm:ss` of the global countdown.
    #[must_use]
    pub fn global_remaining_label(&self) -> Option<String> {
        self.global_remaining_secs
            .map(|secs| format!("{:02}:{:02}", secs / 60, secs % 60))
    }
}
