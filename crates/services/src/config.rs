use std::env;
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_SCHEDULE_INTERVAL_MS: u64 = 10_000;

/// Cadence of the background polling loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Status and roster polling, used by the lobby and the observer.
    pub poll_interval: Duration,
    /// Scheduled auto-start / auto-end checks.
    pub schedule_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            schedule_interval: Duration::from_millis(DEFAULT_SCHEDULE_INTERVAL_MS),
        }
    }
}

impl SyncConfig {
    /// Read `PROCTOR_POLL_INTERVAL_MS` and `PROCTOR_SCHEDULE_INTERVAL_MS`, keeping
    /// defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidInterval` when a variable is set but is not a
    /// positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            poll_interval: interval(&lookup, "PROCTOR_POLL_INTERVAL_MS")?
                .unwrap_or(defaults.poll_interval),
            schedule_interval: interval(&lookup, "PROCTOR_SCHEDULE_INTERVAL_MS")?
                .unwrap_or(defaults.schedule_interval),
        })
    }
}

fn interval(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Some(Duration::from_millis(ms))),
        _ => Err(ConfigError::InvalidInterval { var, raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_keep_defaults() {
        let config = SyncConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.schedule_interval, Duration::from_secs(10));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = SyncConfig::from_lookup(|key| match key {
            "PROCTOR_POLL_INTERVAL_MS" => Some(" 500 ".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.schedule_interval, Duration::from_secs(10));
    }

    #[test]
    fn zero_or_garbage_is_rejected() {
        let err = SyncConfig::from_lookup(|key| {
            (key == "PROCTOR_SCHEDULE_INTERVAL_MS").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidInterval { var: "PROCTOR_SCHEDULE_INTERVAL_MS", .. }
        ));

        assert!(SyncConfig::from_lookup(|_| Some("soon".into())).is_err());
    }
}
