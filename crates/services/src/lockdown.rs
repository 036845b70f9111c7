use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    Disarmed,
    Armed,
    /// A leave confirmation is on screen.
    Prompting,
}

/// What the host should do with a tab close / reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadDecision {
    Allow,
    /// Show the platform's native "leave page?" warning. Nothing is submitted.
    Warn,
}

/// What the host should do with a back navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackIntercept {
    /// Not locked down; let the navigation happen.
    PassThrough,
    /// Navigation suppressed; ask the learner to confirm leaving.
    Confirm,
    /// A confirmation is already showing; swallow the event.
    Pending,
}

/// Confirmation dialog for leaving a locked-down session.
#[async_trait]
pub trait ExitPrompt: Send + Sync {
    /// Returns true when the learner confirms submit-and-exit.
    async fn confirm_exit(&self) -> bool;
}

/// Prompt that always gives the same answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticPrompt(pub bool);

#[async_trait]
impl ExitPrompt for StaticPrompt {
    async fn confirm_exit(&self) -> bool {
        self.0
    }
}

/// Navigation guard for locked-down sessions.
#[derive(Debug, Clone, Copy)]
pub struct LockdownGuard {
    enabled: bool,
    state: GuardState,
}

impl LockdownGuard {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: GuardState::Disarmed,
        }
    }

    #[must_use]
    pub fn state(&self) -> GuardState {
        self.state
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.state != GuardState::Disarmed
    }

    /// Arm on entering Active. No-op when lockdown is off.
    pub fn arm(&mut self) {
        if self.enabled {
            self.state = GuardState::Armed;
        }
    }

    pub fn disarm(&mut self) {
        self.state = GuardState::Disarmed;
    }

    #[must_use]
    pub fn before_unload(&self) -> UnloadDecision {
        if self.is_armed() {
            UnloadDecision::Warn
        } else {
            UnloadDecision::Allow
        }
    }

    pub fn intercept_back(&mut self) -> BackIntercept {
        match self.state {
            GuardState::Disarmed => BackIntercept::PassThrough,
            GuardState::Armed => {
                self.state = GuardState::Prompting;
                BackIntercept::Confirm
            }
            GuardState::Prompting => BackIntercept::Pending,
        }
    }

    /// Close the confirmation. Returns true when the session should submit and exit.
    pub fn resolve(&mut self, confirmed: bool) -> bool {
        if self.state != GuardState::Prompting {
            return false;
        }
        if confirmed {
            self.state = GuardState::Disarmed;
        } else {
            self.state = GuardState::Armed;
        }
        confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_guard_never_arms() {
        let mut guard = LockdownGuard::new(false);
        guard.arm();
        assert_eq!(guard.state(), GuardState::Disarmed);
        assert_eq!(guard.before_unload(), UnloadDecision::Allow);
        assert_eq!(guard.intercept_back(), BackIntercept::PassThrough);
    }

    #[test]
    fn cancel_rearms_and_prompts_again() {
        let mut guard = LockdownGuard::new(true);
        guard.arm();
        assert_eq!(guard.before_unload(), UnloadDecision::Warn);

        assert_eq!(guard.intercept_back(), BackIntercept::Confirm);
        assert_eq!(guard.intercept_back(), BackIntercept::Pending);
        assert!(!guard.resolve(false));
        assert_eq!(guard.state(), GuardState::Armed);

        assert_eq!(guard.intercept_back(), BackIntercept::Confirm);
        assert!(guard.resolve(true));
        assert_eq!(guard.state(), GuardState::Disarmed);
        assert_eq!(guard.before_unload(), UnloadDecision::Allow);
    }

    #[test]
    fn resolve_without_prompt_is_ignored() {
        let mut guard = LockdownGuard::new(true);
        guard.arm();
        assert!(!guard.resolve(true));
        assert_eq!(guard.state(), GuardState::Armed);
    }

    #[tokio::test]
    async fn static_prompt_answers() {
        assert!(StaticPrompt(true).confirm_exit().await);
        assert!(!StaticPrompt(false).confirm_exit().await);
    }
}
