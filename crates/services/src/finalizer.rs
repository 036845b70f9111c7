use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use gateway::{LibraryApi, SubmissionApi};
use proctor_core::model::{
    AssessmentDefinition, LibraryItemId, SessionState, SubmissionId, SubmissionPayload,
    SubmissionReceipt, SubmitTrigger, SubmittedAnswer,
};
use proctor_core::time::seconds_between;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::SubmissionError;

const LIBRARY_UPDATE_CAPACITY: usize = 16;

/// Local notification that a library item was read by a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryUpdate {
    pub item: LibraryItemId,
    pub submission_id: SubmissionId,
}

/// Everything needed to build the payload at submit time.
#[derive(Debug, Clone, Copy)]
pub struct FinalizeRequest<'a> {
    pub definition: &'a AssessmentDefinition,
    pub state: &'a SessionState,
    pub trigger: SubmitTrigger,
    pub now: DateTime<Utc>,
}

/// Build the submission payload from the session state.
///
/// Answers follow authoring order; unanswered questions are omitted.
///
/// # Errors
///
/// Returns `SubmissionError::NotStarted` if the session never started.
pub fn build_payload(
    request: &FinalizeRequest<'_>,
    client_submission_id: Uuid,
) -> Result<SubmissionPayload, SubmissionError> {
    let state = request.state;
    let started_at = state.started_at().ok_or(SubmissionError::NotStarted)?;
    let answers = request
        .definition
        .questions()
        .iter()
        .filter_map(|question| {
            state.answer_for(question.id()).map(|answer| SubmittedAnswer {
                question_id: question.id(),
                answer: answer.clone(),
            })
        })
        .collect();

    Ok(SubmissionPayload {
        client_submission_id,
        answers,
        submitted_at: request.now,
        time_spent_seconds: seconds_between(started_at, request.now),
        focus_loss_count: state.focus_loss_count(),
        focus_loss_durations: state.focus_loss_log().to_vec(),
        session_started_at: started_at,
        total_away_ms: state.total_away_ms(),
        trigger: request.trigger,
    })
}

/// Clears the in-flight flag however the submit future ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Posts the final payload at most once per session.
pub struct SubmissionFinalizer {
    submissions: Arc<dyn SubmissionApi>,
    library: Arc<dyn LibraryApi>,
    client_submission_id: Uuid,
    in_flight: AtomicBool,
    submitted: AtomicBool,
    payload: Mutex<Option<SubmissionPayload>>,
    updates: broadcast::Sender<LibraryUpdate>,
}

impl SubmissionFinalizer {
    #[must_use]
    pub fn new(submissions: Arc<dyn SubmissionApi>, library: Arc<dyn LibraryApi>) -> Self {
        let (updates, _) = broadcast::channel(LIBRARY_UPDATE_CAPACITY);
        Self {
            submissions,
            library,
            client_submission_id: Uuid::new_v4(),
            in_flight: AtomicBool::new(false),
            submitted: AtomicBool::new(false),
            payload: Mutex::new(None),
            updates,
        }
    }

    #[must_use]
    pub fn client_submission_id(&self) -> Uuid {
        self.client_submission_id
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.submitted.load(Ordering::Acquire)
    }

    /// The payload built by the first attempt, if any.
    #[must_use]
    pub fn cached_payload(&self) -> Option<SubmissionPayload> {
        self.cache().clone()
    }

    #[must_use]
    pub fn subscribe_library(&self) -> broadcast::Receiver<LibraryUpdate> {
        self.updates.subscribe()
    }

    fn cache(&self) -> MutexGuard<'_, Option<SubmissionPayload>> {
        match self.payload.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Submit the session. Retries reuse the payload of the first attempt.
    ///
    /// # Errors
    ///
    /// - `SubmissionError::AlreadySubmitted` once a submission was accepted.
    /// - `SubmissionError::InFlight` while another call is waiting on the backend.
    /// - `SubmissionError::Rejected` when the backend call fails; the guard is cleared.
    pub async fn finalize(
        &self,
        request: FinalizeRequest<'_>,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        if self.is_submitted() {
            return Err(SubmissionError::AlreadySubmitted);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SubmissionError::InFlight);
        }
        let _in_flight = InFlight(&self.in_flight);

        let payload = {
            let mut cache = self.cache();
            match cache.as_ref() {
                Some(payload) => payload.clone(),
                None => {
                    let payload = build_payload(&request, self.client_submission_id)?;
                    *cache = Some(payload.clone());
                    payload
                }
            }
        };

        let assessment = request.definition.id();
        let submission_id = match self.submissions.submit(assessment, &payload).await {
            Ok(id) => id,
            Err(err) => {
                warn!(assessment_id = %assessment, error = %err, "submission failed");
                return Err(SubmissionError::Rejected(err));
            }
        };
        self.submitted.store(true, Ordering::Release);
        info!(
            assessment_id = %assessment,
            submission_id = %submission_id,
            trigger = ?payload.trigger,
            answers = payload.answers.len(),
            "assessment submitted"
        );

        if let Some(item) = request.definition.library_item() {
            self.mark_read(item, &submission_id).await;
        }

        Ok(SubmissionReceipt {
            submission_id,
            trigger: payload.trigger,
            submitted_at: payload.submitted_at,
        })
    }

    async fn mark_read(&self, item: LibraryItemId, submission_id: &SubmissionId) {
        if let Err(err) = self.library.mark_as_read(item).await {
            warn!(library_item = %item, error = %err, "could not mark library item as read");
        }
        let _ = self.updates.send(LibraryUpdate {
            item,
            submission_id: submission_id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use gateway::{ApiError, InMemoryBackend};
    use proctor_core::model::{
        AnswerOption, AnswerValue, AssessmentDraft, AssessmentId, OptionId, QuestionDraft,
        QuestionId, QuestionKind,
    };
    use proctor_core::time::fixed_now;

    use super::*;

    fn definition() -> AssessmentDefinition {
        let mut draft = AssessmentDraft::new(AssessmentId::new(5), "Quiz")
            .with_library_item(LibraryItemId::new(40));
        for i in 1..=3 {
            draft = draft.with_question(
                QuestionDraft::new(QuestionId::new(i), QuestionKind::SingleChoice, "?")
                    .with_options(vec![
                        AnswerOption::new(OptionId::new(i * 10), "a"),
                        AnswerOption::new(OptionId::new(i * 10 + 1), "b"),
                    ]),
            );
        }
        draft.validate().unwrap()
    }

    fn started_state() -> SessionState {
        let mut state = SessionState::new(3, false).unwrap();
        state.start(fixed_now()).unwrap();
        state
    }

    fn finalizer(backend: &InMemoryBackend) -> SubmissionFinalizer {
        SubmissionFinalizer::new(Arc::new(backend.clone()), Arc::new(backend.clone()))
    }

    #[test]
    fn payload_lists_answers_in_authoring_order() {
        let definition = definition();
        let mut state = started_state();
        state
            .record_answer(QuestionId::new(3), AnswerValue::Choice(OptionId::new(31)))
            .unwrap();
        state
            .record_answer(QuestionId::new(1), AnswerValue::Choice(OptionId::new(10)))
            .unwrap();
        state.mark_away(fixed_now() + ChronoDuration::seconds(5));
        state.mark_returned(fixed_now() + ChronoDuration::milliseconds(6_200));

        let request = FinalizeRequest {
            definition: &definition,
            state: &state,
            trigger: SubmitTrigger::ManualExit,
            now: fixed_now() + ChronoDuration::seconds(42),
        };
        let payload = build_payload(&request, Uuid::from_u128(1)).unwrap();

        let order: Vec<u64> = payload.answers.iter().map(|a| a.question_id.value()).collect();
        assert_eq!(order, vec![1, 3]);
        assert_eq!(payload.time_spent_seconds, 42);
        assert_eq!(payload.focus_loss_count, 1);
        assert_eq!(payload.focus_loss_durations, vec![1_200]);
        assert_eq!(payload.total_away_ms, 1_200);
        assert_eq!(payload.session_started_at, fixed_now());
    }

    #[test]
    fn unstarted_session_has_no_payload() {
        let definition = definition();
        let state = SessionState::new(3, false).unwrap();
        let request = FinalizeRequest {
            definition: &definition,
            state: &state,
            trigger: SubmitTrigger::Completed,
            now: fixed_now(),
        };
        assert!(matches!(
            build_payload(&request, Uuid::nil()),
            Err(SubmissionError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn second_finalize_is_refused() {
        let backend = InMemoryBackend::new();
        let finalizer = finalizer(&backend);
        let mut updates = finalizer.subscribe_library();
        let definition = definition();
        let state = started_state();
        let request = FinalizeRequest {
            definition: &definition,
            state: &state,
            trigger: SubmitTrigger::Completed,
            now: fixed_now(),
        };

        let receipt = finalizer.finalize(request).await.unwrap();
        assert_eq!(receipt.trigger, SubmitTrigger::Completed);
        assert!(matches!(
            finalizer.finalize(request).await,
            Err(SubmissionError::AlreadySubmitted)
        ));
        assert_eq!(backend.submit_attempts(), 1);
        assert_eq!(backend.read_items(), vec![LibraryItemId::new(40)]);
        assert_eq!(updates.recv().await.unwrap().item, LibraryItemId::new(40));
    }

    #[tokio::test]
    async fn failed_submit_can_be_retried_with_the_same_payload() {
        let backend = InMemoryBackend::new();
        backend.fail_next_submissions(1);
        let finalizer = finalizer(&backend);
        let definition = definition();
        let state = started_state();
        let first = FinalizeRequest {
            definition: &definition,
            state: &state,
            trigger: SubmitTrigger::GlobalTimeout,
            now: fixed_now() + ChronoDuration::seconds(10),
        };

        let err = finalizer.finalize(first).await.unwrap_err();
        assert!(err.is_retryable());
        let cached = finalizer.cached_payload().unwrap();

        let retry = FinalizeRequest {
            now: fixed_now() + ChronoDuration::seconds(30),
            trigger: SubmitTrigger::ManualExit,
            ..first
        };
        let receipt = finalizer.finalize(retry).await.unwrap();
        assert_eq!(receipt.trigger, SubmitTrigger::GlobalTimeout);
        assert_eq!(receipt.submitted_at, cached.submitted_at);

        let accepted = backend.submissions();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].client_submission_id, finalizer.client_submission_id());
        assert_eq!(backend.submit_attempts(), 2);
    }

    #[tokio::test]
    async fn library_failure_does_not_fail_the_submit() {
        let backend = InMemoryBackend::new();
        backend.fail_library(true);
        let finalizer = finalizer(&backend);
        let definition = definition();
        let state = started_state();
        let request = FinalizeRequest {
            definition: &definition,
            state: &state,
            trigger: SubmitTrigger::Completed,
            now: fixed_now(),
        };
        assert!(finalizer.finalize(request).await.is_ok());
        assert!(backend.read_items().is_empty());
    }

    struct SlowSubmissions {
        backend: InMemoryBackend,
    }

    #[async_trait]
    impl SubmissionApi for SlowSubmissions {
        async fn submit(
            &self,
            assessment: AssessmentId,
            payload: &SubmissionPayload,
        ) -> Result<SubmissionId, ApiError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.backend.submit(assessment, payload).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn racing_finalize_calls_post_once() {
        let backend = InMemoryBackend::new();
        let finalizer = SubmissionFinalizer::new(
            Arc::new(SlowSubmissions {
                backend: backend.clone(),
            }),
            Arc::new(backend.clone()),
        );
        let definition = definition();
        let state = started_state();
        let request = |trigger| FinalizeRequest {
            definition: &definition,
            state: &state,
            trigger,
            now: fixed_now(),
        };

        let (a, b, c) = tokio::join!(
            finalizer.finalize(request(SubmitTrigger::Completed)),
            finalizer.finalize(request(SubmitTrigger::GlobalTimeout)),
            finalizer.finalize(request(SubmitTrigger::LockdownExit)),
        );

        assert!(a.is_ok());
        assert!(matches!(b, Err(SubmissionError::InFlight)));
        assert!(matches!(c, Err(SubmissionError::InFlight)));
        assert_eq!(backend.submit_attempts(), 1);
        assert_eq!(backend.submissions()[0].trigger, SubmitTrigger::Completed);
    }
}
