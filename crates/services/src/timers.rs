//! Global and per-question countdowns.
//!
//! Each countdown is a tokio task that ticks once per second on an unbounded channel
//! and stops on its own `CancellationToken`. The controller filters every event
//! through `TimerSubsystem::resolve` so events from replaced or canceled timers never
//! reach the state machine.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    GlobalTick { remaining_secs: u64 },
    GlobalExpired,
    QuestionTick { generation: u64, remaining_secs: u64 },
    QuestionExpired { generation: u64 },
}

impl TimerEvent {
    /// Lower sorts first when several events are ready together.
    pub(crate) fn priority(self) -> u8 {
        match self {
            TimerEvent::GlobalExpired => 0,
            TimerEvent::QuestionExpired { .. } => 1,
            TimerEvent::GlobalTick { .. } | TimerEvent::QuestionTick { .. } => 2,
        }
    }

    #[must_use]
    pub fn is_expiry(self) -> bool {
        matches!(
            self,
            TimerEvent::GlobalExpired | TimerEvent::QuestionExpired { .. }
        )
    }
}

/// A running countdown. Dropping it cancels the task.
#[derive(Debug)]
struct Countdown {
    token: CancellationToken,
    deadline: Instant,
}

impl Countdown {
    fn spawn<F>(
        limit: Duration,
        events: mpsc::UnboundedSender<TimerEvent>,
        tick: F,
        expired: TimerEvent,
    ) -> Self
    where
        F: Fn(u64) -> TimerEvent + Send + 'static,
    {
        let token = CancellationToken::new();
        let started = Instant::now();
        let deadline = started + limit;
        let cancelled = token.clone();

        tokio::spawn(async move {
            let mut elapsed_secs = 0u64;
            loop {
                elapsed_secs += 1;
                let wake = (started + Duration::from_secs(elapsed_secs)).min(deadline);
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => return,
                    () = sleep_until(wake) => {}
                }
                if wake >= deadline {
                    let _ = events.send(expired);
                    return;
                }
                if events.send(tick(whole_secs(deadline - wake))).is_err() {
                    return;
                }
            }
        });

        Self { token, deadline }
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn whole_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Owns the global deadline and the current question's countdown.
#[derive(Debug)]
pub struct TimerSubsystem {
    events: mpsc::UnboundedSender<TimerEvent>,
    global: Option<Countdown>,
    question: Option<Countdown>,
    generation: u64,
}

impl TimerSubsystem {
    /// Create the subsystem and the receiver its countdowns report to.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let timers = Self {
            events,
            global: None,
            question: None,
            generation: 0,
        };
        (timers, rx)
    }

    /// Start (or restart) the global deadline.
    pub fn start_global(&mut self, limit: Duration) {
        trace!(limit_secs = limit.as_secs(), "global countdown started");
        self.global = Some(Countdown::spawn(
            limit,
            self.events.clone(),
            |remaining_secs| TimerEvent::GlobalTick { remaining_secs },
            TimerEvent::GlobalExpired,
        ));
    }

    /// Replace the per-question countdown and return its generation.
    pub fn start_question(&mut self, limit: Duration) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        trace!(generation, limit_secs = limit.as_secs(), "question countdown started");
        self.question = Some(Countdown::spawn(
            limit,
            self.events.clone(),
            move |remaining_secs| TimerEvent::QuestionTick {
                generation,
                remaining_secs,
            },
            TimerEvent::QuestionExpired { generation },
        ));
        generation
    }

    pub fn cancel_question(&mut self) {
        if self.question.take().is_some() {
            self.generation += 1;
        }
    }

    pub fn cancel_all(&mut self) {
        self.global = None;
        self.cancel_question();
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn global_remaining(&self) -> Option<Duration> {
        self.global.as_ref().map(Countdown::remaining)
    }

    #[must_use]
    pub fn question_remaining(&self) -> Option<Duration> {
        self.question.as_ref().map(Countdown::remaining)
    }

    fn global_deadline_reached(&self) -> bool {
        self.global
            .as_ref()
            .is_some_and(|global| global.deadline <= Instant::now())
    }

    /// Filter a raw event against the current timers.
    ///
    /// Returns `None` for events from canceled or replaced countdowns. A question
    /// expiry at or past the global deadline is reported as `GlobalExpired`. Expiries
    /// consume their countdown, so each one is delivered at most once.
    pub fn resolve(&mut self, event: TimerEvent) -> Option<TimerEvent> {
        match event {
            TimerEvent::GlobalTick { .. } => self.global.is_some().then_some(event),
            TimerEvent::GlobalExpired => {
                self.global.take()?;
                self.cancel_question();
                Some(TimerEvent::GlobalExpired)
            }
            TimerEvent::QuestionTick { generation, .. } => {
                (self.question.is_some() && generation == self.generation).then_some(event)
            }
            TimerEvent::QuestionExpired { generation } => {
                if self.question.is_none() || generation != self.generation {
                    return None;
                }
                if self.global_deadline_reached() {
                    self.cancel_all();
                    return Some(TimerEvent::GlobalExpired);
                }
                self.question = None;
                Some(event)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_resolved(
        timers: &mut TimerSubsystem,
        rx: &mut mpsc::UnboundedReceiver<TimerEvent>,
    ) -> TimerEvent {
        loop {
            let raw = rx.recv().await.unwrap();
            if let Some(event) = timers.resolve(raw) {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn global_countdown_ticks_then_expires() {
        let (mut timers, mut rx) = TimerSubsystem::new();
        timers.start_global(Duration::from_secs(3));

        assert_eq!(
            next_resolved(&mut timers, &mut rx).await,
            TimerEvent::GlobalTick { remaining_secs: 2 }
        );
        assert_eq!(
            next_resolved(&mut timers, &mut rx).await,
            TimerEvent::GlobalTick { remaining_secs: 1 }
        );
        assert_eq!(next_resolved(&mut timers, &mut rx).await, TimerEvent::GlobalExpired);
        assert!(timers.global_remaining().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn restarted_question_timer_drops_stale_events() {
        let (mut timers, mut rx) = TimerSubsystem::new();
        let first = timers.start_question(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(500)).await;
        let second = timers.start_question(Duration::from_secs(2));
        assert!(second > first);

        assert_eq!(
            timers.resolve(TimerEvent::QuestionExpired { generation: first }),
            None
        );
        assert_eq!(
            next_resolved(&mut timers, &mut rx).await,
            TimerEvent::QuestionTick {
                generation: second,
                remaining_secs: 1
            }
        );
        assert_eq!(
            next_resolved(&mut timers, &mut rx).await,
            TimerEvent::QuestionExpired { generation: second }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn canceled_question_timer_is_silent() {
        let (mut timers, mut rx) = TimerSubsystem::new();
        let generation = timers.start_question(Duration::from_secs(1));
        timers.cancel_question();

        tokio::time::sleep(Duration::from_secs(3)).await;
        while let Ok(raw) = rx.try_recv() {
            assert_eq!(timers.resolve(raw), None);
        }
        assert_eq!(
            timers.resolve(TimerEvent::QuestionExpired { generation }),
            None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn simultaneous_expiry_resolves_to_global() {
        let (mut timers, mut rx) = TimerSubsystem::new();
        timers.start_global(Duration::from_secs(2));
        let generation = timers.start_question(Duration::from_secs(2));

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        let mut ready = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            ready.push(raw);
        }
        assert!(ready.contains(&TimerEvent::QuestionExpired { generation }));

        // Whichever expiry is resolved first, exactly one GlobalExpired comes out.
        let question_first = timers.resolve(TimerEvent::QuestionExpired { generation });
        assert_eq!(question_first, Some(TimerEvent::GlobalExpired));
        assert_eq!(timers.resolve(TimerEvent::GlobalExpired), None);
    }

    #[test]
    fn expiries_sort_before_ticks() {
        let mut events = vec![
            TimerEvent::QuestionTick {
                generation: 1,
                remaining_secs: 3,
            },
            TimerEvent::QuestionExpired { generation: 1 },
            TimerEvent::GlobalExpired,
        ];
        events.sort_by_key(|event| event.priority());
        assert_eq!(events[0], TimerEvent::GlobalExpired);
        assert!(events[1].is_expiry());
    }
}
