use std::sync::Arc;

use async_trait::async_trait;
use proctor_core::model::{
    AssessmentDraft, AssessmentId, FocusEvent, LibraryItemId, LiveSessionId, LiveSessionStatus,
    ParticipantId, ParticipantProgress, ProgressEvent, SubmissionId, SubmissionPayload,
};
use thiserror::Error;

/// Errors surfaced by backend adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("request failed with status {0}")]
    HttpStatus(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    /// True for failures where sending the same request again might succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport(_) | ApiError::Unavailable(_) => true,
            ApiError::HttpStatus(code) => *code >= 500 || *code == 429,
            ApiError::NotFound | ApiError::Decode(_) => false,
        }
    }
}

/// Assessment fetch contract (`GET`).
#[async_trait]
pub trait AssessmentApi: Send + Sync {
    /// Fetch an assessment definition with its settings.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the assessment does not exist, or other
    /// transport errors.
    async fn fetch_assessment(&self, id: AssessmentId) -> Result<AssessmentDraft, ApiError>;
}

/// Live-session contract: presence, telemetry, status polling, schedule control.
#[async_trait]
pub trait LiveSessionApi: Send + Sync {
    /// Join the lobby of a live session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the server rejects or cannot be reached.
    async fn join(&self, session: LiveSessionId, participant: ParticipantId)
    -> Result<(), ApiError>;

    /// Leave a live session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the server rejects or cannot be reached.
    async fn leave(
        &self,
        session: LiveSessionId,
        participant: ParticipantId,
    ) -> Result<(), ApiError>;

    /// Report an away/return transition.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on any failure; callers treat it as best-effort.
    async fn report_focus(&self, session: LiveSessionId, event: &FocusEvent)
    -> Result<(), ApiError>;

    /// Push one answered (or expired) question to the observer.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on any failure; callers treat it as best-effort.
    async fn post_progress(
        &self,
        session: LiveSessionId,
        event: &ProgressEvent,
    ) -> Result<(), ApiError>;

    /// Current status snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for unknown sessions, or transport errors.
    async fn status(&self, session: LiveSessionId) -> Result<LiveSessionStatus, ApiError>;

    /// Progress snapshot for every participant.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport or decoding failures.
    async fn participants(
        &self,
        session: LiveSessionId,
    ) -> Result<Vec<ParticipantProgress>, ApiError>;

    /// Mark the session as started.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the server rejects the request.
    async fn start(&self, session: LiveSessionId) -> Result<(), ApiError>;

    /// Mark the session as ended.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the server rejects the request.
    async fn end(&self, session: LiveSessionId) -> Result<(), ApiError>;
}

/// Submission contract (`POST`).
#[async_trait]
pub trait SubmissionApi: Send + Sync {
    /// Post the final payload and return the server-issued submission id.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the submission is not accepted.
    async fn submit(
        &self,
        assessment: AssessmentId,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionId, ApiError>;
}

/// Library contract (`PATCH`), used for the post-submit "mark as read" side effect.
#[async_trait]
pub trait LibraryApi: Send + Sync {
    /// Mark a library item as read.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on any failure; callers treat it as best-effort.
    async fn mark_as_read(&self, item: LibraryItemId) -> Result<(), ApiError>;
}

/// Aggregates every contract behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Backend {
    pub assessments: Arc<dyn AssessmentApi>,
    pub live: Arc<dyn LiveSessionApi>,
    pub submissions: Arc<dyn SubmissionApi>,
    pub library: Arc<dyn LibraryApi>,
}

impl Backend {
    /// Build a backend where every contract is served by one adapter.
    #[must_use]
    pub fn from_adapter<A>(adapter: A) -> Self
    where
        A: AssessmentApi + LiveSessionApi + SubmissionApi + LibraryApi + Clone + 'static,
    {
        Self {
            assessments: Arc::new(adapter.clone()),
            live: Arc::new(adapter.clone()),
            submissions: Arc::new(adapter.clone()),
            library: Arc::new(adapter),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_adapter(crate::memory::InMemoryBackend::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_classified() {
        assert!(ApiError::Transport("reset".into()).is_transient());
        assert!(ApiError::HttpStatus(503).is_transient());
        assert!(ApiError::HttpStatus(429).is_transient());
        assert!(!ApiError::HttpStatus(400).is_transient());
        assert!(!ApiError::NotFound.is_transient());
    }
}
