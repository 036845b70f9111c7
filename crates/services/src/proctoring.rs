//! Focus-loss tracking.
//!
//! Hosts publish visibility changes into a `FocusSource`; the monitor forwards them to
//! the session's event loop, which applies them to `SessionState` through
//! `ProctoringMonitor::apply`.

use chrono::{DateTime, Utc};
use proctor_core::model::{FocusEvent, SessionState};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::progress::ProgressReporter;

const FOCUS_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
    Visible,
    Hidden,
}

/// Anything that can report page/window visibility changes.
pub trait FocusSource: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<FocusState>;
}

/// Broadcast-backed focus source that hosts push into.
#[derive(Debug, Clone)]
pub struct FocusChannel {
    sender: broadcast::Sender<FocusState>,
}

impl FocusChannel {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FOCUS_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish a visibility change. Returns how many listeners received it.
    pub fn publish(&self, state: FocusState) -> usize {
        self.sender.send(state).unwrap_or(0)
    }
}

impl Default for FocusChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl FocusSource for FocusChannel {
    fn subscribe(&self) -> broadcast::Receiver<FocusState> {
        self.sender.subscribe()
    }
}

/// Effect of one visibility change on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    WentAway,
    Returned { duration_ms: u64 },
}

pub struct ProctoringMonitor {
    reporter: ProgressReporter,
    listener: Option<DropGuard>,
}

impl ProctoringMonitor {
    #[must_use]
    pub fn new(reporter: ProgressReporter) -> Self {
        Self {
            reporter,
            listener: None,
        }
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.listener.is_some()
    }

    /// Start forwarding `source` into `forward`. Re-attaching replaces the old listener.
    pub fn attach(&mut self, source: &dyn FocusSource, forward: mpsc::UnboundedSender<FocusState>) {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let mut changes = source.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => break,
                    received = changes.recv() => match received {
                        Ok(state) => {
                            if forward.send(state).is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "focus changes dropped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("focus listener stopped");
        });

        self.listener = Some(token.drop_guard());
    }

    /// Stop listening and close an open away interval at `at`.
    pub fn detach(&mut self, state: &mut SessionState, at: DateTime<Utc>) -> Option<FocusChange> {
        let attached = self.listener.take().is_some();
        if !attached {
            return None;
        }
        let duration_ms = state.mark_returned(at)?;
        self.report(FocusChange::Returned { duration_ms }, at);
        Some(FocusChange::Returned { duration_ms })
    }

    /// Apply a visibility change. Duplicate transitions are ignored.
    pub fn apply(
        &self,
        state: &mut SessionState,
        focus: FocusState,
        at: DateTime<Utc>,
    ) -> Option<FocusChange> {
        if !self.is_attached() {
            return None;
        }
        let change = match focus {
            FocusState::Hidden => state.mark_away(at).then_some(FocusChange::WentAway),
            FocusState::Visible => state
                .mark_returned(at)
                .map(|duration_ms| FocusChange::Returned { duration_ms }),
        }?;
        self.report(change, at);
        Some(change)
    }

    fn report(&self, change: FocusChange, at: DateTime<Utc>) {
        let participant_id = self.reporter.participant();
        let event = match change {
            FocusChange::WentAway => FocusEvent::Away { participant_id, at },
            FocusChange::Returned { duration_ms } => FocusEvent::Returned {
                participant_id,
                at,
                duration_ms,
            },
        };
        self.reporter.report_focus(event);
    }
}
