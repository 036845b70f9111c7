use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use gateway::{ApiError, LiveSessionApi};
use proctor_core::model::{AnswerValue, FocusEvent, LiveSessionId, ParticipantId, ProgressEvent, QuestionId};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Fire-and-forget telemetry for a live session.
///
/// Every call spawns its own task; the caller never waits and failures are only
/// logged and counted. Without a live session every report is a no-op.
#[derive(Clone)]
pub struct ProgressReporter {
    api: Arc<dyn LiveSessionApi>,
    session: Option<LiveSessionId>,
    participant: ParticipantId,
    tracker: TaskTracker,
    failures: Arc<AtomicUsize>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(
        api: Arc<dyn LiveSessionApi>,
        session: Option<LiveSessionId>,
        participant: ParticipantId,
    ) -> Self {
        Self {
            api,
            session,
            participant,
            tracker: TaskTracker::new(),
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn session(&self) -> Option<LiveSessionId> {
        self.session
    }

    #[must_use]
    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.session.is_some()
    }

    /// Number of telemetry calls that failed so far.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    /// Report a committed (or expired) question.
    pub fn report_answer(
        &self,
        question_id: QuestionId,
        answer: Option<AnswerValue>,
        expired: bool,
        at: DateTime<Utc>,
    ) {
        let event = ProgressEvent {
            participant_id: self.participant,
            question_id,
            answer,
            expired,
            recorded_at: at,
        };
        self.spawn_best_effort("progress", move |api, session| async move {
            api.post_progress(session, &event).await
        });
    }

    pub fn report_focus(&self, event: FocusEvent) {
        self.spawn_best_effort("focus", move |api, session| async move {
            api.report_focus(session, &event).await
        });
    }

    pub fn join(&self) {
        let participant = self.participant;
        self.spawn_best_effort("join", move |api, session| async move {
            api.join(session, participant).await
        });
    }

    pub fn leave(&self) {
        let participant = self.participant;
        self.spawn_best_effort("leave", move |api, session| async move {
            api.leave(session, participant).await
        });
    }

    /// Wait for every report spawned so far.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn spawn_best_effort<F, Fut>(&self, kind: &'static str, call: F)
    where
        F: FnOnce(Arc<dyn LiveSessionApi>, LiveSessionId) -> Fut,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let Some(session) = self.session else {
            return;
        };
        let request = call(Arc::clone(&self.api), session);
        let failures = Arc::clone(&self.failures);
        self.tracker.spawn(async move {
            match request.await {
                Ok(()) => debug!(kind, session_id = %session, "telemetry sent"),
                Err(err) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    warn!(kind, session_id = %session, error = %err, "telemetry dropped");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use gateway::InMemoryBackend;
    use proctor_core::model::{LiveSchedule, OptionId};
    use proctor_core::time::fixed_now;

    use super::*;

    fn reporter(backend: &InMemoryBackend, session: Option<LiveSessionId>) -> ProgressReporter {
        ProgressReporter::new(Arc::new(backend.clone()), session, ParticipantId::new(3))
    }

    #[tokio::test]
    async fn answers_reach_the_live_session() {
        let backend = InMemoryBackend::new();
        let session = LiveSessionId::new(9);
        backend.create_live_session(session, LiveSchedule::default());
        let reporter = reporter(&backend, Some(session));

        reporter.join();
        reporter.drain().await;
        reporter.report_answer(
            QuestionId::new(1),
            Some(AnswerValue::Choice(OptionId::new(11))),
            false,
            fixed_now(),
        );
        reporter.report_answer(QuestionId::new(2), None, true, fixed_now());
        reporter.drain().await;

        let events = backend.progress_events(session);
        assert_eq!(events.len(), 2);
        assert!(events[1].expired);
        assert_eq!(events[1].answer, None);
        assert_eq!(reporter.failed_count(), 0);
    }

    #[tokio::test]
    async fn failures_are_counted_not_raised() {
        let backend = InMemoryBackend::new();
        let session = LiveSessionId::new(9);
        backend.create_live_session(session, LiveSchedule::default());
        backend.fail_telemetry(true);
        let reporter = reporter(&backend, Some(session));

        reporter.report_focus(FocusEvent::Away {
            participant_id: ParticipantId::new(3),
            at: fixed_now(),
        });
        reporter.report_answer(QuestionId::new(1), None, true, fixed_now());
        reporter.drain().await;

        assert_eq!(reporter.failed_count(), 2);
        assert!(backend.progress_events(session).is_empty());
    }

    #[tokio::test]
    async fn offline_sessions_send_nothing() {
        let backend = InMemoryBackend::new();
        let reporter = reporter(&backend, None);
        reporter.join();
        reporter.report_answer(QuestionId::new(1), None, true, fixed_now());
        reporter.drain().await;
        assert!(!reporter.is_live());
        assert_eq!(reporter.failed_count(), 0);
    }
}
