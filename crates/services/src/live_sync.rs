//! Observer-side polling of a live session.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use gateway::{ApiError, LiveSessionApi};
use proctor_core::model::{LiveSessionId, LiveSessionStatus, ParticipantId, ParticipantProgress};
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;

const NOTIFICATION_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotification {
    /// The session went active for the first time since it was targeted.
    SessionStarted(LiveSessionId),
    ParticipantJoined(ParticipantId),
    ParticipantLeft(ParticipantId),
}

/// Participants added and removed by one reconcile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterChanges {
    pub joined: Vec<ParticipantId>,
    pub left: Vec<ParticipantId>,
}

/// Server-authoritative view of everyone in a live session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    session: Option<LiveSessionId>,
    is_active: bool,
    participants: BTreeMap<ParticipantId, ParticipantProgress>,
}

impl Roster {
    #[must_use]
    pub fn new(session: LiveSessionId) -> Self {
        Self {
            session: Some(session),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn session(&self) -> Option<LiveSessionId> {
        self.session
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: ParticipantId) -> Option<&ParticipantProgress> {
        self.participants.get(&id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &ParticipantProgress> {
        self.participants.values()
    }

    #[must_use]
    pub fn away_count(&self) -> usize {
        self.participants().filter(|p| p.is_away).count()
    }

    #[must_use]
    pub fn submitted_count(&self) -> usize {
        self.participants().filter(|p| p.submitted).count()
    }

    /// Replace the roster with the server snapshot.
    ///
    /// Participants missing from the snapshot are dropped; nothing is merged from
    /// the previous poll.
    pub fn reconcile(
        &mut self,
        status: &LiveSessionStatus,
        snapshot: Vec<ParticipantProgress>,
    ) -> RosterChanges {
        let next: BTreeMap<ParticipantId, ParticipantProgress> = snapshot
            .into_iter()
            .map(|progress| (progress.participant_id, progress))
            .collect();

        let changes = RosterChanges {
            joined: next
                .keys()
                .filter(|id| !self.participants.contains_key(id))
                .copied()
                .collect(),
            left: self
                .participants
                .keys()
                .filter(|id| !next.contains_key(id))
                .copied()
                .collect(),
        };

        self.session = Some(status.session_id);
        self.is_active = status.is_active;
        self.participants = next;
        changes
    }
}

/// Fires once, on the first inactive → active transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivationLatch {
    was_active: bool,
    fired: bool,
}

impl ActivationLatch {
    /// Feed the latest status; returns true exactly once.
    pub fn observe(&mut self, is_active: bool) -> bool {
        let fire = is_active && !self.was_active && !self.fired;
        self.was_active = is_active;
        self.fired |= fire;
        fire
    }

    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

/// Fetch status and progress for one session.
///
/// # Errors
///
/// Returns the first `ApiError` of either request.
pub async fn poll_once(
    api: &dyn LiveSessionApi,
    session: LiveSessionId,
) -> Result<(LiveSessionStatus, Vec<ParticipantProgress>), ApiError> {
    tokio::try_join!(api.status(session), api.participants(session))
}

/// Keeps a `Roster` in sync with one live session at a time.
///
/// Dropping the handle stops the poll task.
pub struct LiveSessionSync {
    api: Arc<dyn LiveSessionApi>,
    interval: Duration,
    roster: watch::Sender<Roster>,
    notifications: broadcast::Sender<SyncNotification>,
    target: Option<LiveSessionId>,
    task: Option<DropGuard>,
}

impl LiveSessionSync {
    #[must_use]
    pub fn new(api: Arc<dyn LiveSessionApi>, config: &SyncConfig) -> Self {
        let (roster, _) = watch::channel(Roster::default());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            api,
            interval: config.poll_interval,
            roster,
            notifications,
            target: None,
            task: None,
        }
    }

    #[must_use]
    pub fn target(&self) -> Option<LiveSessionId> {
        self.target
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    #[must_use]
    pub fn roster(&self) -> watch::Receiver<Roster> {
        self.roster.subscribe()
    }

    #[must_use]
    pub fn notifications(&self) -> broadcast::Receiver<SyncNotification> {
        self.notifications.subscribe()
    }

    /// Start polling `session`, replacing any previous target.
    pub fn retarget(&mut self, session: LiveSessionId) {
        self.stop();
        self.roster.send_replace(Roster::new(session));

        let token = CancellationToken::new();
        tokio::spawn(poll_loop(
            Arc::clone(&self.api),
            session,
            self.interval,
            self.roster.clone(),
            self.notifications.clone(),
            token.clone(),
        ));
        info!(session_id = %session, "watching live session");
        self.target = Some(session);
        self.task = Some(token.drop_guard());
    }

    pub fn stop(&mut self) {
        if self.task.take().is_some()
            && let Some(session) = self.target.take()
        {
            debug!(session_id = %session, "stopped watching live session");
        }
    }
}

async fn poll_loop(
    api: Arc<dyn LiveSessionApi>,
    session: LiveSessionId,
    period: Duration,
    roster: watch::Sender<Roster>,
    notifications: broadcast::Sender<SyncNotification>,
    token: CancellationToken,
) {
    let mut latch = ActivationLatch::default();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let polled = tokio::select! {
            biased;
            () = token.cancelled() => break,
            polled = async {
                ticker.tick().await;
                poll_once(api.as_ref(), session).await
            } => polled,
        };

        let (status, snapshot) = match polled {
            Ok(polled) => polled,
            Err(err) => {
                warn!(session_id = %session, error = %err, "live session poll failed");
                continue;
            }
        };

        let mut changes = RosterChanges::default();
        roster.send_modify(|roster| changes = roster.reconcile(&status, snapshot));
        for id in changes.joined {
            let _ = notifications.send(SyncNotification::ParticipantJoined(id));
        }
        for id in changes.left {
            let _ = notifications.send(SyncNotification::ParticipantLeft(id));
        }
        if latch.observe(status.is_active) {
            info!(session_id = %session, "live session started");
            let _ = notifications.send(SyncNotification::SessionStarted(session));
        }
    }
}

#[cfg(test)]
mod tests {
    use proctor_core::model::LiveSchedule;

    use super::*;

    fn progress(id: u64) -> ParticipantProgress {
        ParticipantProgress {
            participant_id: ParticipantId::new(id),
            display_name: format!("P{id}"),
            current_index: 0,
            answered: 0,
            focus_loss_count: 0,
            is_away: false,
            submitted: false,
        }
    }

    fn status(is_active: bool) -> LiveSessionStatus {
        LiveSessionStatus {
            session_id: LiveSessionId::new(1),
            is_active,
            schedule: LiveSchedule::default(),
        }
    }

    #[test]
    fn reconcile_replaces_the_roster() {
        let mut roster = Roster::default();
        let changes = roster.reconcile(&status(false), vec![progress(1), progress(2)]);
        assert_eq!(changes.joined.len(), 2);
        assert_eq!(roster.len(), 2);

        let mut away = progress(2);
        away.is_away = true;
        let changes = roster.reconcile(&status(true), vec![away, progress(3)]);
        assert_eq!(changes.joined, vec![ParticipantId::new(3)]);
        assert_eq!(changes.left, vec![ParticipantId::new(1)]);
        assert!(roster.get(ParticipantId::new(1)).is_none());
        assert_eq!(roster.away_count(), 1);
        assert!(roster.is_active());
    }

    #[test]
    fn latch_fires_once() {
        let mut latch = ActivationLatch::default();
        assert!(!latch.observe(false));
        assert!(latch.observe(true));
        assert!(!latch.observe(true));
        assert!(!latch.observe(false));
        assert!(!latch.observe(true));
        assert!(latch.has_fired());
    }
}
