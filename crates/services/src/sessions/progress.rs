use proctor_core::model::{SessionState, SessionStatus};
use serde::Serialize;

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub remaining: usize,
    pub is_complete: bool,
}

impl SessionProgress {
    #[must_use]
    pub fn from_state(state: &SessionState) -> Self {
        let answered = state.answers().len();
        Self {
            total: state.total(),
            answered,
            remaining: state.total().saturating_sub(answered),
            is_complete: state.status() == SessionStatus::Finished,
        }
    }
}
