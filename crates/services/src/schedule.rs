//! Scheduled auto-start / auto-end of a live session.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gateway::{ApiError, LiveSessionApi};
use proctor_core::Clock;
use proctor_core::model::{LiveSchedule, LiveSessionId};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::time::SessionClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleAction {
    Start,
    End,
}

/// Decide whether a session is due to start or end at `now`.
#[must_use]
pub fn evaluate(schedule: &LiveSchedule, is_active: bool, now: DateTime<Utc>) -> Option<ScheduleAction> {
    let ended = schedule.ends_at.is_some_and(|end| now >= end);
    if is_active {
        return ended.then_some(ScheduleAction::End);
    }
    let due = schedule.starts_at.is_some_and(|start| now >= start);
    (due && !ended).then_some(ScheduleAction::Start)
}

/// Periodically applies the schedule of one live session.
pub struct ScheduleChecker {
    api: Arc<dyn LiveSessionApi>,
    session: LiveSessionId,
    clock: SessionClock,
    interval: Duration,
    auto_started: bool,
}

impl ScheduleChecker {
    #[must_use]
    pub fn new(api: Arc<dyn LiveSessionApi>, session: LiveSessionId, config: &SyncConfig) -> Self {
        Self {
            api,
            session,
            clock: SessionClock::default(),
            interval: config.schedule_interval,
            auto_started: false,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = SessionClock::new(clock);
        self
    }

    /// Compare the schedule with the server status and start/end the session if due.
    ///
    /// A session this checker already started is not started again after it was
    /// stopped by hand.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the status fetch or the start/end call fails.
    pub async fn check_once(&mut self) -> Result<Option<ScheduleAction>, ApiError> {
        let status = self.api.status(self.session).await?;
        let action = match evaluate(&status.schedule, status.is_active, self.clock.now()) {
            Some(ScheduleAction::Start) if self.auto_started => None,
            action => action,
        };

        match action {
            Some(ScheduleAction::Start) => {
                self.api.start(self.session).await?;
                self.auto_started = true;
                info!(session_id = %self.session, "scheduled start reached");
            }
            Some(ScheduleAction::End) => {
                self.api.end(self.session).await?;
                info!(session_id = %self.session, "scheduled end reached");
            }
            None => {}
        }
        Ok(action)
    }

    /// Check on every interval until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(err) = self.check_once().await {
                warn!(session_id = %self.session, error = %err, "schedule check failed");
            }
        }
    }
}
