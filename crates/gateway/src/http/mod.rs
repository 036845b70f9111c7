use std::env;
use std::time::Duration;

use async_trait::async_trait;
use proctor_core::model::{
    AssessmentDraft, AssessmentId, FocusEvent, LibraryItemId, LiveSessionId, LiveSessionStatus,
    ParticipantId, ParticipantProgress, ProgressEvent, SubmissionId, SubmissionPayload,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::api::{ApiError, AssessmentApi, LibraryApi, LiveSessionApi, SubmissionApi};

mod wire;

use wire::{
    AssessmentRecord, JoinRequest, MarkReadRequest, ParticipantRecord, StatusRecord,
    SubmissionAccepted,
};

const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("PROCTOR_API_URL is not set")]
    MissingBaseUrl,
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}

/// Connection settings for the HTTP backend.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: Url,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    /// Build a config from an explicit base URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if the URL does not parse or cannot be a base.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            api_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.api_token = (!token.trim().is_empty()).then_some(token);
        self
    }

    /// Read `PROCTOR_API_URL`, `PROCTOR_API_TOKEN` and `PROCTOR_HTTP_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the URL is missing or invalid, or the timeout is not a number.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = env::var("PROCTOR_API_URL").map_err(|_| ConfigError::MissingBaseUrl)?;
        let mut config = Self::new(&raw)?;
        if let Ok(token) = env::var("PROCTOR_API_TOKEN") {
            config = config.with_token(token);
        }
        if let Ok(raw) = env::var("PROCTOR_HTTP_TIMEOUT_SECS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
            config.timeout = Duration::from_secs(secs.max(1));
        }
        Ok(config)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    // Url::join drops the last path segment unless the base ends with '/'.
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&normalized).map_err(|_| ConfigError::InvalidBaseUrl(raw.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidBaseUrl(raw.to_string()));
    }
    Ok(url)
}

/// Backend that talks JSON over HTTP.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    config: ClientConfig,
}

impl HttpBackend {
    /// Build the backend and its connection pool.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Transport` if the HTTP client cannot be constructed.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.config
            .base_url
            .join(path)
            .map_err(|e| ApiError::Transport(e.to_string()))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self.authorize(request).send().await.map_err(transport)?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "backend response");
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        if !status.is_success() {
            return Err(ApiError::HttpStatus(status.as_u16()));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(self.client.get(self.url(path)?)).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn post_empty(&self, path: &str) -> Result<(), ApiError> {
        self.send(self.client.post(self.url(path)?)).await?;
        Ok(())
    }
}

fn transport(err: reqwest::Error) -> ApiError {
    if err.is_timeout() || err.is_connect() {
        ApiError::Unavailable(err.to_string())
    } else {
        ApiError::Transport(err.to_string())
    }
}

#[async_trait]
impl AssessmentApi for HttpBackend {
    async fn fetch_assessment(&self, id: AssessmentId) -> Result<AssessmentDraft, ApiError> {
        let record: AssessmentRecord = self.get_json(&format!("assessments/{id}")).await?;
        Ok(record.into_draft())
    }
}

#[async_trait]
impl LiveSessionApi for HttpBackend {
    async fn join(
        &self,
        session: LiveSessionId,
        participant: ParticipantId,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!("live-sessions/{session}/join"))?;
        let body = JoinRequest { participant_id: participant };
        self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    async fn leave(
        &self,
        session: LiveSessionId,
        participant: ParticipantId,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!("live-sessions/{session}/leave"))?;
        let body = JoinRequest { participant_id: participant };
        self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    async fn report_focus(
        &self,
        session: LiveSessionId,
        event: &FocusEvent,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!("live-sessions/{session}/focus"))?;
        self.send(self.client.post(url).json(event)).await?;
        Ok(())
    }

    async fn post_progress(
        &self,
        session: LiveSessionId,
        event: &ProgressEvent,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!("live-sessions/{session}/answers"))?;
        self.send(self.client.post(url).json(event)).await?;
        Ok(())
    }

    async fn status(&self, session: LiveSessionId) -> Result<LiveSessionStatus, ApiError> {
        let record: StatusRecord = self
            .get_json(&format!("live-sessions/{session}/status"))
            .await?;
        Ok(record.into_status(session))
    }

    async fn participants(
        &self,
        session: LiveSessionId,
    ) -> Result<Vec<ParticipantProgress>, ApiError> {
        let records: Vec<ParticipantRecord> = self
            .get_json(&format!("live-sessions/{session}/progress"))
            .await?;
        Ok(records.into_iter().map(ParticipantRecord::into_progress).collect())
    }

    async fn start(&self, session: LiveSessionId) -> Result<(), ApiError> {
        self.post_empty(&format!("live-sessions/{session}/start")).await
    }

    async fn end(&self, session: LiveSessionId) -> Result<(), ApiError> {
        self.post_empty(&format!("live-sessions/{session}/end")).await
    }
}

#[async_trait]
impl SubmissionApi for HttpBackend {
    async fn submit(
        &self,
        assessment: AssessmentId,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionId, ApiError> {
        let url = self.url(&format!("assessments/{assessment}/submissions"))?;
        let response = self.send(self.client.post(url).json(payload)).await?;
        let accepted: SubmissionAccepted = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(SubmissionId::new(accepted.submission_id))
    }
}

#[async_trait]
impl LibraryApi for HttpBackend {
    async fn mark_as_read(&self, item: LibraryItemId) -> Result<(), ApiError> {
        let url = self.url(&format!("library/{item}"))?;
        let body = MarkReadRequest { is_read: true };
        self.send(self.client.patch(url).json(&body)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let config = ClientConfig::new("https://exams.example.com/api/v1").unwrap();
        assert_eq!(config.base_url.as_str(), "https://exams.example.com/api/v1/");
        let joined = config.base_url.join("assessments/7").unwrap();
        assert_eq!(joined.as_str(), "https://exams.example.com/api/v1/assessments/7");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            ClientConfig::new("not a url"),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            ClientConfig::new("mailto:someone@example.com"),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn blank_token_is_ignored() {
        let config = ClientConfig::new("http://localhost:8080").unwrap().with_token("  ");
        assert!(config.api_token.is_none());
    }

    #[test]
    fn backend_builds_endpoint_urls() {
        let backend = HttpBackend::new(ClientConfig::new("http://localhost:8080/api").unwrap())
            .unwrap();
        let url = backend.url("live-sessions/3/status").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/live-sessions/3/status");
    }
}
