#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod finalizer;
pub mod handoff;
pub mod live_sync;
pub mod loader;
pub mod lobby;
pub mod lockdown;
pub mod proctoring;
pub mod progress;
pub mod schedule;
pub mod sequencer;
pub mod sessions;
pub mod time;
pub mod timers;

pub use proctor_core::Clock;
pub use sessions as session;

pub use config::SyncConfig;
pub use error::{
    ConfigError, HandoffError, LoadError, LobbyError, SessionError, SubmissionError,
};
pub use finalizer::{FinalizeRequest, LibraryUpdate, SubmissionFinalizer};
pub use handoff::HandoffSlot;
pub use live_sync::{LiveSessionSync, Roster, SyncNotification};
pub use loader::AssessmentLoader;
pub use lobby::Lobby;
pub use lockdown::{BackIntercept, ExitPrompt, LockdownGuard, StaticPrompt, UnloadDecision};
pub use proctoring::{FocusChannel, FocusSource, FocusState, ProctoringMonitor};
pub use progress::ProgressReporter;
pub use schedule::{ScheduleAction, ScheduleChecker};
pub use sequencer::{QuestionSequencer, Sequence};
pub use sessions::{
    SessionBuilder, SessionCommand, SessionController, SessionDeps, SessionEvent, SessionView,
    Transition,
};
pub use time::SessionClock;
pub use timers::{TimerEvent, TimerSubsystem};
