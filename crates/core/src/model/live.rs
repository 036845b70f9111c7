use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::answer::AnswerValue;
use crate::model::ids::{LiveSessionId, ParticipantId, QuestionId};

/// Planned start/end of a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LiveSchedule {
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// Server snapshot of a live session's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSessionStatus {
    pub session_id: LiveSessionId,
    /// Only an explicit `true` from the server counts as active.
    pub is_active: bool,
    pub schedule: LiveSchedule,
}

/// Server snapshot of one participant's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProgress {
    pub participant_id: ParticipantId,
    pub display_name: String,
    /// `-1` while waiting, `total` once past the last question.
    pub current_index: i64,
    pub answered: usize,
    pub focus_loss_count: usize,
    pub is_away: bool,
    pub submitted: bool,
}

/// Per-answer event streamed to the observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub participant_id: ParticipantId,
    pub question_id: QuestionId,
    /// `None` when the question timer expired before an answer was given.
    pub answer: Option<AnswerValue>,
    pub expired: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Focus telemetry streamed to the observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FocusEvent {
    Away {
        participant_id: ParticipantId,
        at: DateTime<Utc>,
    },
    Returned {
        participant_id: ParticipantId,
        at: DateTime<Utc>,
        duration_ms: u64,
    },
}
