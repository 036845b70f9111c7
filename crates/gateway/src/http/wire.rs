//! JSON shapes exchanged with the HTTP backend and their mapping to domain types.

use chrono::{DateTime, Utc};
use proctor_core::model::{
    AnswerOption, AnswerValue, AssessmentDraft, AssessmentId, AssessmentSettings, LibraryItemId,
    LiveSchedule, LiveSessionId, LiveSessionStatus, OptionId, ParticipantId, ParticipantProgress,
    QuestionDraft, QuestionId, QuestionKind,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AssessmentRecord {
    id: AssessmentId,
    title: String,
    questions: Vec<QuestionRecord>,
    #[serde(default)]
    time_limit_secs: Option<u32>,
    #[serde(default)]
    settings: SettingsRecord,
    #[serde(default)]
    library_item_id: Option<LibraryItemId>,
    #[serde(default)]
    live_session_id: Option<LiveSessionId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::struct_excessive_bools)]
struct SettingsRecord {
    shuffle_questions: bool,
    shuffle_options: bool,
    lockdown: bool,
    track_focus_loss: bool,
    show_progress: bool,
    allow_backtrack: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionRecord {
    id: QuestionId,
    #[serde(rename = "type")]
    kind: QuestionKind,
    prompt: String,
    #[serde(default)]
    options: Vec<OptionRecord>,
    #[serde(default)]
    correct_answer: Option<AnswerValue>,
    #[serde(default = "default_points")]
    points: u32,
    #[serde(default)]
    time_limit_secs: Option<u32>,
    #[serde(default)]
    media_url: Option<String>,
}

fn default_points() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct OptionRecord {
    id: OptionId,
    label: String,
}

impl AssessmentRecord {
    pub(crate) fn into_draft(self) -> AssessmentDraft {
        AssessmentDraft {
            id: self.id,
            title: self.title,
            questions: self
                .questions
                .into_iter()
                .map(QuestionRecord::into_draft)
                .collect(),
            time_limit_secs: self.time_limit_secs,
            settings: AssessmentSettings {
                shuffle_questions: self.settings.shuffle_questions,
                shuffle_options: self.settings.shuffle_options,
                lockdown: self.settings.lockdown,
                track_focus_loss: self.settings.track_focus_loss,
                show_progress: self.settings.show_progress,
                allow_backtrack: self.settings.allow_backtrack,
            },
            library_item: self.library_item_id,
            live_session: self.live_session_id,
        }
    }
}

impl QuestionRecord {
    fn into_draft(self) -> QuestionDraft {
        QuestionDraft {
            id: self.id,
            kind: self.kind,
            prompt: self.prompt,
            options: self
                .options
                .into_iter()
                .map(|option| AnswerOption::new(option.id, option.label))
                .collect(),
            correct_answer: self.correct_answer,
            points: self.points,
            time_limit_secs: self.time_limit_secs,
            media: self.media_url,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusRecord {
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    scheduled_start: Option<DateTime<Utc>>,
    #[serde(default)]
    scheduled_end: Option<DateTime<Utc>>,
}

impl StatusRecord {
    pub(crate) fn into_status(self, session_id: LiveSessionId) -> LiveSessionStatus {
        LiveSessionStatus {
            session_id,
            // Missing or null never counts as active.
            is_active: self.is_active == Some(true),
            schedule: LiveSchedule {
                starts_at: self.scheduled_start,
                ends_at: self.scheduled_end,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ParticipantRecord {
    participant_id: ParticipantId,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default = "waiting_index")]
    current_index: i64,
    #[serde(default)]
    answered: usize,
    #[serde(default)]
    focus_loss_count: usize,
    #[serde(default)]
    is_away: bool,
    #[serde(default)]
    submitted: bool,
}

fn waiting_index() -> i64 {
    -1
}

impl ParticipantRecord {
    pub(crate) fn into_progress(self) -> ParticipantProgress {
        ParticipantProgress {
            display_name: self
                .display_name
                .unwrap_or_else(|| format!("Participant {}", self.participant_id)),
            participant_id: self.participant_id,
            current_index: self.current_index,
            answered: self.answered,
            focus_loss_count: self.focus_loss_count,
            is_away: self.is_away,
            submitted: self.submitted,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JoinRequest {
    pub(crate) participant_id: ParticipantId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MarkReadRequest {
    pub(crate) is_read: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmissionAccepted {
    pub(crate) submission_id: String,
}
