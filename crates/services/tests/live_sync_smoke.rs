use std::sync::Arc;
use std::time::Duration;

use gateway::InMemoryBackend;
use proctor_core::model::{LiveSchedule, LiveSessionId, ParticipantId, ParticipantProgress};
use services::{LiveSessionSync, SyncConfig, SyncNotification};
use tokio::sync::broadcast::error::TryRecvError;

fn participant(id: u64) -> ParticipantProgress {
    ParticipantProgress {
        participant_id: ParticipantId::new(id),
        display_name: format!("Learner {id}"),
        current_index: -1,
        answered: 0,
        focus_loss_count: 0,
        is_away: false,
        submitted: false,
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<SyncNotification>) -> Vec<SyncNotification> {
    let mut seen = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(notification) => seen.push(notification),
            Err(TryRecvError::Empty | TryRecvError::Closed) => return seen,
            Err(TryRecvError::Lagged(_)) => {}
        }
    }
}

fn started(seen: &[SyncNotification]) -> usize {
    seen.iter()
        .filter(|n| matches!(n, SyncNotification::SessionStarted(_)))
        .count()
}

#[tokio::test(start_paused = true)]
async fn observer_sees_roster_and_a_single_start() {
    let backend = InMemoryBackend::new();
    let session = LiveSessionId::new(1);
    backend.create_live_session(session, LiveSchedule::default());
    backend.upsert_participant(session, participant(1));
    backend.upsert_participant(session, participant(2));

    let mut sync = LiveSessionSync::new(Arc::new(backend.clone()), &SyncConfig::default());
    let mut notifications = sync.notifications();
    let roster = sync.roster();
    sync.retarget(session);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(roster.borrow().len(), 2);
    assert!(!roster.borrow().is_active());
    let seen = drain(&mut notifications);
    assert_eq!(started(&seen), 0);
    assert!(seen.contains(&SyncNotification::ParticipantJoined(ParticipantId::new(2))));

    backend.set_active(session, true);
    backend.remove_participant(session, ParticipantId::new(1));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(roster.borrow().is_active());
    assert!(roster.borrow().get(ParticipantId::new(1)).is_none());
    let seen = drain(&mut notifications);
    assert_eq!(started(&seen), 1);
    assert!(seen.contains(&SyncNotification::ParticipantLeft(ParticipantId::new(1))));

    // Flapping does not fire the latch again.
    backend.set_active(session, false);
    tokio::time::sleep(Duration::from_secs(2)).await;
    backend.set_active(session, true);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(started(&drain(&mut notifications)), 0);
}

#[tokio::test(start_paused = true)]
async fn poll_errors_keep_the_last_roster() {
    let backend = InMemoryBackend::new();
    let session = LiveSessionId::new(3);
    backend.create_live_session(session, LiveSchedule::default());
    backend.upsert_participant(session, participant(9));

    let mut sync = LiveSessionSync::new(Arc::new(backend.clone()), &SyncConfig::default());
    let roster = sync.roster();
    sync.retarget(session);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(roster.borrow().len(), 1);

    backend.fail_next_status_polls(2);
    backend.remove_participant(session, ParticipantId::new(9));
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(roster.borrow().len(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(roster.borrow().is_empty());
}

#[tokio::test(start_paused = true)]
async fn retarget_switches_sessions_with_a_fresh_latch() {
    let backend = InMemoryBackend::new();
    let first = LiveSessionId::new(1);
    let second = LiveSessionId::new(2);
    backend.create_live_session(first, LiveSchedule::default());
    backend.create_live_session(second, LiveSchedule::default());
    backend.set_active(first, true);
    backend.set_active(second, true);
    backend.upsert_participant(second, participant(4));

    let mut sync = LiveSessionSync::new(Arc::new(backend.clone()), &SyncConfig::default());
    let mut notifications = sync.notifications();
    let roster = sync.roster();

    sync.retarget(first);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        drain(&mut notifications),
        vec![SyncNotification::SessionStarted(first)]
    );

    sync.retarget(second);
    assert_eq!(sync.target(), Some(second));
    tokio::time::sleep(Duration::from_millis(100)).await;
    let seen = drain(&mut notifications);
    assert!(seen.contains(&SyncNotification::SessionStarted(second)));
    assert_eq!(roster.borrow().session(), Some(second));
    assert_eq!(roster.borrow().len(), 1);

    let polls = backend.status_polls();
    drop(sync);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(backend.status_polls(), polls);
}
