use proctor_core::model::{AnswerValue, SubmissionReceipt};

use crate::proctoring::{FocusChange, FocusState};
use crate::timers::TimerEvent;

/// Internal input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Timer(TimerEvent),
    Focus(FocusState),
}

impl SessionEvent {
    pub(crate) fn priority(&self) -> u8 {
        match self {
            SessionEvent::Timer(event) => event.priority(),
            SessionEvent::Focus(_) => 2,
        }
    }
}

/// Learner or host action, sent to a running controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    /// Record the answer for the current question and move on.
    Commit(AnswerValue),
    /// Record without moving on (multi-choice edits, text drafts).
    Record(AnswerValue),
    Next,
    Previous,
    /// Browser/back navigation.
    Back,
    ExitAndSubmit,
    RetrySubmit,
}

/// What an action or event did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Started,
    Moved { position: usize },
    Recorded,
    Ticked,
    Focus(FocusChange),
    /// Lockdown prompt was dismissed; the learner stays.
    Stayed,
    /// No lockdown; the host may perform the navigation.
    LeaveAllowed,
    Submitted(SubmissionReceipt),
    /// The action had no effect in the current status.
    Ignored,
}

impl Transition {
    #[must_use]
    pub fn is_submitted(&self) -> bool {
        matches!(self, Transition::Submitted(_))
    }
}
