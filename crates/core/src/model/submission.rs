use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::answer::AnswerValue;
use crate::model::ids::{QuestionId, SubmissionId};

/// What caused the session to be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    /// The learner moved past the last question.
    Completed,
    /// The global deadline reached zero.
    GlobalTimeout,
    /// The learner confirmed leaving a locked-down session.
    LockdownExit,
    /// The learner chose "exit & submit".
    ManualExit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: QuestionId,
    pub answer: AnswerValue,
}

/// Final payload posted to the submit endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    /// Stable across manual retries so the server can drop duplicates.
    pub client_submission_id: Uuid,
    pub answers: Vec<SubmittedAnswer>,
    pub submitted_at: DateTime<Utc>,
    pub time_spent_seconds: u64,
    pub focus_loss_count: usize,
    pub focus_loss_durations: Vec<u64>,
    pub session_started_at: DateTime<Utc>,
    pub total_away_ms: u64,
    pub trigger: SubmitTrigger,
}

impl SubmissionPayload {
    #[must_use]
    pub fn answer_for(&self, question: QuestionId) -> Option<&AnswerValue> {
        self.answers
            .iter()
            .find(|entry| entry.question_id == question)
            .map(|entry| &entry.answer)
    }
}

/// Server acknowledgement for an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub submission_id: SubmissionId,
    pub trigger: SubmitTrigger,
    pub submitted_at: DateTime<Utc>,
}
