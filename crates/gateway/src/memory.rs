use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use proctor_core::model::{
    AssessmentDraft, AssessmentId, FocusEvent, LibraryItemId, LiveSchedule, LiveSessionId,
    LiveSessionStatus, ParticipantId, ParticipantProgress, ProgressEvent, SubmissionId,
    SubmissionPayload,
};

use crate::api::{ApiError, AssessmentApi, LibraryApi, LiveSessionApi, SubmissionApi};

#[derive(Debug, Default)]
struct LiveRecord {
    is_active: bool,
    schedule: LiveSchedule,
    participants: BTreeMap<ParticipantId, ParticipantProgress>,
    progress: Vec<ProgressEvent>,
    focus: Vec<FocusEvent>,
}

#[derive(Debug, Default)]
struct Inner {
    assessments: HashMap<AssessmentId, AssessmentDraft>,
    live: HashMap<LiveSessionId, LiveRecord>,
    submissions: Vec<(AssessmentId, SubmissionPayload, SubmissionId)>,
    submit_attempts: usize,
    read_items: Vec<LibraryItemId>,
    fail_submissions: usize,
    fail_status_polls: usize,
    fail_telemetry: bool,
    fail_library: bool,
    status_polls: usize,
}

/// Simple in-memory backend for tests and prototyping.
///
/// Behaves like a cooperative server: joining registers a participant, progress
/// and focus events update that participant's snapshot, and resubmitting a
/// payload with a known client id returns the original submission id.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, ApiError> {
        self.inner
            .lock()
            .map_err(|e| ApiError::Unavailable(e.to_string()))
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    //
    // ─── SEEDING ───────────────────────────────────────────────────────────────
    //

    pub fn insert_assessment(&self, draft: AssessmentDraft) {
        self.with(|inner| {
            inner.assessments.insert(draft.id, draft);
        });
    }

    pub fn create_live_session(&self, id: LiveSessionId, schedule: LiveSchedule) {
        self.with(|inner| {
            inner.live.insert(
                id,
                LiveRecord {
                    schedule,
                    ..LiveRecord::default()
                },
            );
        });
    }

    pub fn set_active(&self, id: LiveSessionId, is_active: bool) {
        self.with(|inner| {
            inner.live.entry(id).or_default().is_active = is_active;
        });
    }

    pub fn upsert_participant(&self, id: LiveSessionId, progress: ParticipantProgress) {
        self.with(|inner| {
            inner
                .live
                .entry(id)
                .or_default()
                .participants
                .insert(progress.participant_id, progress);
        });
    }

    pub fn remove_participant(&self, id: LiveSessionId, participant: ParticipantId) {
        self.with(|inner| {
            if let Some(record) = inner.live.get_mut(&id) {
                record.participants.remove(&participant);
            }
        });
    }

    //
    // ─── FAILURE INJECTION ─────────────────────────────────────────────────────
    //

    /// Reject the next `count` submit calls with a 503.
    pub fn fail_next_submissions(&self, count: usize) {
        self.with(|inner| inner.fail_submissions = count);
    }

    /// Reject the next `count` status polls with a transport error.
    pub fn fail_next_status_polls(&self, count: usize) {
        self.with(|inner| inner.fail_status_polls = count);
    }

    /// Reject every progress/focus/presence call while enabled.
    pub fn fail_telemetry(&self, fail: bool) {
        self.with(|inner| inner.fail_telemetry = fail);
    }

    pub fn fail_library(&self, fail: bool) {
        self.with(|inner| inner.fail_library = fail);
    }

    //
    // ─── INSPECTION ────────────────────────────────────────────────────────────
    //

    /// Accepted submissions, in arrival order.
    #[must_use]
    pub fn submissions(&self) -> Vec<SubmissionPayload> {
        self.with(|inner| {
            inner
                .submissions
                .iter()
                .map(|(_, payload, _)| payload.clone())
                .collect()
        })
    }

    /// Every submit call, accepted or not.
    #[must_use]
    pub fn submit_attempts(&self) -> usize {
        self.with(|inner| inner.submit_attempts)
    }

    #[must_use]
    pub fn status_polls(&self) -> usize {
        self.with(|inner| inner.status_polls)
    }

    #[must_use]
    pub fn progress_events(&self, id: LiveSessionId) -> Vec<ProgressEvent> {
        self.with(|inner| {
            inner
                .live
                .get(&id)
                .map(|record| record.progress.clone())
                .unwrap_or_default()
        })
    }

    #[must_use]
    pub fn focus_events(&self, id: LiveSessionId) -> Vec<FocusEvent> {
        self.with(|inner| {
            inner
                .live
                .get(&id)
                .map(|record| record.focus.clone())
                .unwrap_or_default()
        })
    }

    #[must_use]
    pub fn read_items(&self) -> Vec<LibraryItemId> {
        self.with(|inner| inner.read_items.clone())
    }

    #[must_use]
    pub fn is_active(&self, id: LiveSessionId) -> bool {
        self.with(|inner| inner.live.get(&id).is_some_and(|record| record.is_active))
    }
}

fn telemetry_guard(inner: &Inner) -> Result<(), ApiError> {
    if inner.fail_telemetry {
        return Err(ApiError::Transport("telemetry disabled".into()));
    }
    Ok(())
}

#[async_trait]
impl AssessmentApi for InMemoryBackend {
    async fn fetch_assessment(&self, id: AssessmentId) -> Result<AssessmentDraft, ApiError> {
        let guard = self.lock()?;
        guard.assessments.get(&id).cloned().ok_or(ApiError::NotFound)
    }
}

#[async_trait]
impl LiveSessionApi for InMemoryBackend {
    async fn join(
        &self,
        session: LiveSessionId,
        participant: ParticipantId,
    ) -> Result<(), ApiError> {
        let mut guard = self.lock()?;
        telemetry_guard(&guard)?;
        let record = guard.live.get_mut(&session).ok_or(ApiError::NotFound)?;
        record
            .participants
            .entry(participant)
            .or_insert_with(|| ParticipantProgress {
                participant_id: participant,
                display_name: format!("Participant {participant}"),
                current_index: -1,
                answered: 0,
                focus_loss_count: 0,
                is_away: false,
                submitted: false,
            });
        Ok(())
    }

    async fn leave(
        &self,
        session: LiveSessionId,
        participant: ParticipantId,
    ) -> Result<(), ApiError> {
        let mut guard = self.lock()?;
        telemetry_guard(&guard)?;
        let record = guard.live.get_mut(&session).ok_or(ApiError::NotFound)?;
        if let Some(progress) = record.participants.get_mut(&participant) {
            progress.submitted = true;
            progress.is_away = false;
        }
        Ok(())
    }

    async fn report_focus(
        &self,
        session: LiveSessionId,
        event: &FocusEvent,
    ) -> Result<(), ApiError> {
        let mut guard = self.lock()?;
        telemetry_guard(&guard)?;
        let record = guard.live.get_mut(&session).ok_or(ApiError::NotFound)?;
        let (participant, away) = match event {
            FocusEvent::Away { participant_id, .. } => (*participant_id, true),
            FocusEvent::Returned { participant_id, .. } => (*participant_id, false),
        };
        if let Some(progress) = record.participants.get_mut(&participant) {
            if away {
                progress.focus_loss_count += 1;
            }
            progress.is_away = away;
        }
        record.focus.push(event.clone());
        Ok(())
    }

    async fn post_progress(
        &self,
        session: LiveSessionId,
        event: &ProgressEvent,
    ) -> Result<(), ApiError> {
        let mut guard = self.lock()?;
        telemetry_guard(&guard)?;
        let record = guard.live.get_mut(&session).ok_or(ApiError::NotFound)?;
        // Counted per distinct question; repeats only replace the answer.
        let earlier: Vec<&ProgressEvent> = record
            .progress
            .iter()
            .filter(|seen| {
                seen.participant_id == event.participant_id && seen.question_id == event.question_id
            })
            .collect();
        let repeat = !earlier.is_empty();
        let answered_before = earlier.iter().any(|seen| seen.answer.is_some());
        if let Some(progress) = record.participants.get_mut(&event.participant_id) {
            if !repeat {
                progress.current_index = progress.current_index.max(0) + 1;
            }
            if event.answer.is_some() && !answered_before {
                progress.answered += 1;
            }
        }
        record.progress.push(event.clone());
        Ok(())
    }

    async fn status(&self, session: LiveSessionId) -> Result<LiveSessionStatus, ApiError> {
        let mut guard = self.lock()?;
        guard.status_polls += 1;
        if guard.fail_status_polls > 0 {
            guard.fail_status_polls -= 1;
            return Err(ApiError::Transport("status poll dropped".into()));
        }
        let record = guard.live.get(&session).ok_or(ApiError::NotFound)?;
        Ok(LiveSessionStatus {
            session_id: session,
            is_active: record.is_active,
            schedule: record.schedule,
        })
    }

    async fn participants(
        &self,
        session: LiveSessionId,
    ) -> Result<Vec<ParticipantProgress>, ApiError> {
        let guard = self.lock()?;
        let record = guard.live.get(&session).ok_or(ApiError::NotFound)?;
        Ok(record.participants.values().cloned().collect())
    }

    async fn start(&self, session: LiveSessionId) -> Result<(), ApiError> {
        let mut guard = self.lock()?;
        let record = guard.live.get_mut(&session).ok_or(ApiError::NotFound)?;
        record.is_active = true;
        Ok(())
    }

    async fn end(&self, session: LiveSessionId) -> Result<(), ApiError> {
        let mut guard = self.lock()?;
        let record = guard.live.get_mut(&session).ok_or(ApiError::NotFound)?;
        record.is_active = false;
        Ok(())
    }
}

#[async_trait]
impl SubmissionApi for InMemoryBackend {
    async fn submit(
        &self,
        assessment: AssessmentId,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionId, ApiError> {
        let mut guard = self.lock()?;
        guard.submit_attempts += 1;
        if guard.fail_submissions > 0 {
            guard.fail_submissions -= 1;
            return Err(ApiError::HttpStatus(503));
        }
        if let Some((_, _, id)) = guard
            .submissions
            .iter()
            .find(|(_, seen, _)| seen.client_submission_id == payload.client_submission_id)
        {
            return Ok(id.clone());
        }
        let id = SubmissionId::new(format!("sub-{}", guard.submissions.len() + 1));
        guard
            .submissions
            .push((assessment, payload.clone(), id.clone()));
        Ok(id)
    }
}

#[async_trait]
impl LibraryApi for InMemoryBackend {
    async fn mark_as_read(&self, item: LibraryItemId) -> Result<(), ApiError> {
        let mut guard = self.lock()?;
        if guard.fail_library {
            return Err(ApiError::HttpStatus(500));
        }
        guard.read_items.push(item);
        Ok(())
    }
}
