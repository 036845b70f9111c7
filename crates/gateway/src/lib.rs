#![forbid(unsafe_code)]

//! Contracts and adapters for the services a session talks to: assessment
//! fetch, live-session presence and progress, submission, and the library.

pub mod api;
pub mod http;
pub mod memory;

pub use api::{ApiError, AssessmentApi, Backend, LibraryApi, LiveSessionApi, SubmissionApi};
pub use http::{ClientConfig, ConfigError, HttpBackend};
pub use memory::InMemoryBackend;
