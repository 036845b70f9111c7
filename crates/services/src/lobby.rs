use std::sync::Arc;
use std::time::Duration;

use gateway::LiveSessionApi;
use proctor_core::model::{AssessmentDefinition, LiveSessionId, LiveSessionStatus, ParticipantId};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::LobbyError;

/// Waiting room for a live session: join, then poll until the observer starts it.
pub struct Lobby {
    api: Arc<dyn LiveSessionApi>,
    session: LiveSessionId,
    participant: ParticipantId,
    interval: Duration,
}

impl Lobby {
    #[must_use]
    pub fn new(
        api: Arc<dyn LiveSessionApi>,
        session: LiveSessionId,
        participant: ParticipantId,
        config: &SyncConfig,
    ) -> Self {
        Self {
            api,
            session,
            participant,
            interval: config.poll_interval,
        }
    }

    /// Lobby for the live session an assessment is attached to.
    ///
    /// # Errors
    ///
    /// Returns `LobbyError::NotLive` for self-paced assessments.
    pub fn for_assessment(
        api: Arc<dyn LiveSessionApi>,
        definition: &AssessmentDefinition,
        participant: ParticipantId,
        config: &SyncConfig,
    ) -> Result<Self, LobbyError> {
        let session = definition.live_session().ok_or(LobbyError::NotLive)?;
        Ok(Self::new(api, session, participant, config))
    }

    #[must_use]
    pub fn session(&self) -> LiveSessionId {
        self.session
    }

    /// Join and wait until the session is active.
    ///
    /// Failed status polls are logged and retried on the next interval.
    ///
    /// # Errors
    ///
    /// Returns `LobbyError::Join` if joining fails, or `LobbyError::Cancelled` when
    /// `cancel` fires first.
    pub async fn wait_until_active(
        &self,
        cancel: &CancellationToken,
    ) -> Result<LiveSessionStatus, LobbyError> {
        self.api
            .join(self.session, self.participant)
            .await
            .map_err(LobbyError::Join)?;
        info!(session_id = %self.session, participant_id = %self.participant, "joined lobby");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            let polled = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(LobbyError::Cancelled),
                polled = async {
                    ticker.tick().await;
                    self.api.status(self.session).await
                } => polled,
            };
            match polled {
                Ok(status) if status.is_active => {
                    info!(session_id = %self.session, "live session is active");
                    return Ok(status);
                }
                Ok(_) => debug!(session_id = %self.session, "still waiting"),
                Err(err) => warn!(session_id = %self.session, error = %err, "status poll failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use gateway::InMemoryBackend;
    use proctor_core::model::LiveSchedule;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn resolves_once_the_session_starts() {
        let backend = InMemoryBackend::new();
        let session = LiveSessionId::new(2);
        backend.create_live_session(session, LiveSchedule::default());
        backend.fail_next_status_polls(1);
        let lobby = Lobby::new(
            Arc::new(backend.clone()),
            session,
            ParticipantId::new(7),
            &SyncConfig::default(),
        );

        let starter = {
            let backend = backend.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                backend.set_active(session, true);
            })
        };

        let status = lobby.wait_until_active(&CancellationToken::new()).await.unwrap();
        starter.await.unwrap();
        assert!(status.is_active);
        // Polls at 0s (dropped), 2s, 4s, 6s.
        assert_eq!(backend.status_polls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_waiting() {
        let backend = InMemoryBackend::new();
        let session = LiveSessionId::new(2);
        backend.create_live_session(session, LiveSchedule::default());
        let lobby = Lobby::new(
            Arc::new(backend.clone()),
            session,
            ParticipantId::new(7),
            &SyncConfig::default(),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        assert!(matches!(
            lobby.wait_until_active(&cancel).await,
            Err(LobbyError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn unknown_session_cannot_be_joined() {
        let backend = InMemoryBackend::new();
        let lobby = Lobby::new(
            Arc::new(backend),
            LiveSessionId::new(99),
            ParticipantId::new(7),
            &SyncConfig::default(),
        );
        assert!(matches!(
            lobby.wait_until_active(&CancellationToken::new()).await,
            Err(LobbyError::Join(_))
        ));
    }
}
