use chrono::{DateTime, Utc};
use proctor_core::Clock;
use tokio::time::Instant;

/// Session timestamps anchored to a wall-clock origin and advanced by the tokio clock.
///
/// Timer tasks run on tokio time, so stamping `started_at`, away intervals and
/// `submitted_at` from the same source keeps them consistent with deadlines, including
/// under a paused test runtime.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    wall_origin: DateTime<Utc>,
    origin: Instant,
}

impl SessionClock {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            wall_origin: clock.now(),
            origin: Instant::now(),
        }
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = self.origin.elapsed();
        match chrono::Duration::from_std(elapsed) {
            Ok(delta) => self.wall_origin + delta,
            Err(_) => self.wall_origin,
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new(Clock::default_clock())
    }
}
