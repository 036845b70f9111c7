use gateway::{ApiError, Backend, InMemoryBackend, LiveSessionApi};
use proctor_core::model::{
    AnswerValue, FocusEvent, LiveSchedule, LiveSessionId, OptionId, ParticipantId, ProgressEvent,
    QuestionId,
};
use proctor_core::time::fixed_now;

#[tokio::test]
async fn live_session_tracks_presence_progress_and_focus() {
    let backend = InMemoryBackend::new();
    let session = LiveSessionId::new(1);
    let learner = ParticipantId::new(7);
    backend.create_live_session(session, LiveSchedule::default());

    backend.join(session, learner).await.unwrap();
    let roster = backend.participants(session).await.unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].current_index, -1);

    backend
        .post_progress(
            session,
            &ProgressEvent {
                participant_id: learner,
                question_id: QuestionId::new(1),
                answer: Some(AnswerValue::Choice(OptionId::new(2))),
                expired: false,
                recorded_at: fixed_now(),
            },
        )
        .await
        .unwrap();
    backend
        .report_focus(
            session,
            &FocusEvent::Away {
                participant_id: learner,
                at: fixed_now(),
            },
        )
        .await
        .unwrap();

    let roster = backend.participants(session).await.unwrap();
    assert_eq!(roster[0].answered, 1);
    assert_eq!(roster[0].current_index, 1);
    assert_eq!(roster[0].focus_loss_count, 1);
    assert!(roster[0].is_away);

    backend.leave(session, learner).await.unwrap();
    let roster = backend.participants(session).await.unwrap();
    assert!(roster[0].submitted);
}

#[tokio::test]
async fn start_and_end_flip_activity() {
    let backend = InMemoryBackend::new();
    let session = LiveSessionId::new(2);
    backend.create_live_session(session, LiveSchedule::default());

    assert!(!backend.status(session).await.unwrap().is_active);
    backend.start(session).await.unwrap();
    assert!(backend.status(session).await.unwrap().is_active);
    backend.end(session).await.unwrap();
    assert!(!backend.status(session).await.unwrap().is_active);
    assert_eq!(backend.status_polls(), 3);
}

#[tokio::test]
async fn telemetry_failures_are_injectable() {
    let backend = InMemoryBackend::new();
    let session = LiveSessionId::new(3);
    backend.create_live_session(session, LiveSchedule::default());
    backend.fail_telemetry(true);

    let err = backend.join(session, ParticipantId::new(1)).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn backend_bundle_shares_one_adapter() {
    let adapter = InMemoryBackend::new();
    let session = LiveSessionId::new(4);
    adapter.create_live_session(session, LiveSchedule::default());
    let backend = Backend::from_adapter(adapter.clone());

    backend.live.start(session).await.unwrap();
    assert!(adapter.is_active(session));
}

#[tokio::test]
async fn repeated_progress_for_one_question_counts_once() {
    let backend = InMemoryBackend::new();
    let session = LiveSessionId::new(4);
    let learner = ParticipantId::new(3);
    backend.create_live_session(session, LiveSchedule::default());
    backend.join(session, learner).await.unwrap();

    let event = |question: u64, answer: Option<u64>| ProgressEvent {
        participant_id: learner,
        question_id: QuestionId::new(question),
        answer: answer.map(|option| AnswerValue::Choice(OptionId::new(option))),
        expired: answer.is_none(),
        recorded_at: fixed_now(),
    };

    backend.post_progress(session, &event(1, None)).await.unwrap();
    backend.post_progress(session, &event(1, Some(10))).await.unwrap();
    backend.post_progress(session, &event(1, Some(11))).await.unwrap();
    backend.post_progress(session, &event(2, Some(20))).await.unwrap();

    let roster = backend.participants(session).await.unwrap();
    assert_eq!(roster[0].current_index, 2);
    assert_eq!(roster[0].answered, 2);
    assert_eq!(backend.progress_events(session).len(), 4);
}
