use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{AssessmentId, LibraryItemId, LiveSessionId, QuestionId};
use crate::model::question::{Question, QuestionDraft, QuestionError};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AssessmentError {
    #[error("assessment title cannot be empty")]
    EmptyTitle,

    #[error("assessment has no questions")]
    NoQuestions,

    #[error("question id {0} appears more than once")]
    DuplicateQuestion(QuestionId),

    #[error("global time limit must be > 0")]
    InvalidTimeLimit,

    #[error(transparent)]
    Question(#[from] QuestionError),
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Delivery settings attached to an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct AssessmentSettings {
    pub shuffle_questions: bool,
    pub shuffle_options: bool,
    /// Block leaving the session without a submit-and-exit.
    pub lockdown: bool,
    pub track_focus_loss: bool,
    pub show_progress: bool,
    pub allow_backtrack: bool,
}

impl AssessmentSettings {
    /// Settings used for proctored exams: lockdown and focus tracking on, no backtracking.
    #[must_use]
    pub fn proctored() -> Self {
        Self {
            shuffle_questions: true,
            shuffle_options: true,
            lockdown: true,
            track_focus_loss: true,
            show_progress: true,
            allow_backtrack: false,
        }
    }

    /// Settings used for self-paced practice tests.
    #[must_use]
    pub fn practice() -> Self {
        Self {
            show_progress: true,
            allow_backtrack: true,
            ..Self::default()
        }
    }
}

//
// ─── DEFINITION ────────────────────────────────────────────────────────────────
//

/// Assessment as received from the authoring system, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentDraft {
    pub id: AssessmentId,
    pub title: String,
    pub questions: Vec<QuestionDraft>,
    pub time_limit_secs: Option<u32>,
    pub settings: AssessmentSettings,
    pub library_item: Option<LibraryItemId>,
    pub live_session: Option<LiveSessionId>,
}

impl AssessmentDraft {
    #[must_use]
    pub fn new(id: AssessmentId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            questions: Vec::new(),
            time_limit_secs: None,
            settings: AssessmentSettings::default(),
            library_item: None,
            live_session: None,
        }
    }

    #[must_use]
    pub fn with_question(mut self, question: QuestionDraft) -> Self {
        self.questions.push(question);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: AssessmentSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_time_limit_secs(mut self, secs: u32) -> Self {
        self.time_limit_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn with_live_session(mut self, id: LiveSessionId) -> Self {
        self.live_session = Some(id);
        self
    }

    #[must_use]
    pub fn with_library_item(mut self, id: LibraryItemId) -> Self {
        self.library_item = Some(id);
        self
    }

    /// Validate the draft into an immutable definition.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError::NoQuestions` for an empty assessment,
    /// `AssessmentError::DuplicateQuestion` for repeated ids, and
    /// `AssessmentError::Question` if any question fails validation.
    pub fn validate(self) -> Result<AssessmentDefinition, AssessmentError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AssessmentError::EmptyTitle);
        }
        if self.questions.is_empty() {
            return Err(AssessmentError::NoQuestions);
        }
        if self.time_limit_secs == Some(0) {
            return Err(AssessmentError::InvalidTimeLimit);
        }

        let mut seen = HashSet::with_capacity(self.questions.len());
        let mut questions = Vec::with_capacity(self.questions.len());
        for draft in self.questions {
            if !seen.insert(draft.id) {
                return Err(AssessmentError::DuplicateQuestion(draft.id));
            }
            questions.push(draft.validate()?);
        }

        Ok(AssessmentDefinition {
            id: self.id,
            title,
            questions,
            time_limit_secs: self.time_limit_secs,
            settings: self.settings,
            library_item: self.library_item,
            live_session: self.live_session,
        })
    }
}

/// Validated, read-only assessment definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentDefinition {
    id: AssessmentId,
    title: String,
    questions: Vec<Question>,
    time_limit_secs: Option<u32>,
    settings: AssessmentSettings,
    library_item: Option<LibraryItemId>,
    live_session: Option<LiveSessionId>,
}

impl AssessmentDefinition {
    #[must_use]
    pub fn id(&self) -> AssessmentId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Questions in authoring order. Never empty.
    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs
            .map(|secs| Duration::from_secs(u64::from(secs)))
    }

    #[must_use]
    pub fn settings(&self) -> &AssessmentSettings {
        &self.settings
    }

    #[must_use]
    pub fn library_item(&self) -> Option<LibraryItemId> {
        self.library_item
    }

    #[must_use]
    pub fn live_session(&self) -> Option<LiveSessionId> {
        self.live_session
    }
}
