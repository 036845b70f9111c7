mod controller;
mod events;
mod progress;
mod view;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use controller::{SessionBuilder, SessionController, SessionDeps};
pub use events::{SessionCommand, SessionEvent, Transition};
pub use progress::SessionProgress;
pub use view::SessionView;
