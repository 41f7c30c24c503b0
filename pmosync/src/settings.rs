//! Tunables of the synchronization engine.

use std::time::Duration;

use pmokodi::methods::DEFAULT_PLAYER_ID;

use crate::errors::SyncError;

pub const DEFAULT_THRESHOLD: Duration = Duration::from_secs(2);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_STARTUP_SETTLE: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncSettings {
    /// Gap between the most advanced and the least advanced node from which
    /// the nodes are resynchronized.
    pub threshold: Duration,
    /// Pause between two sync passes.
    pub check_interval: Duration,
    /// Kodi player addressed by every command.
    pub player_id: i64,
    /// Upper bound on a single poll; `None` waits until the response or the
    /// loss of the connection.
    pub request_timeout: Option<Duration>,
    /// Delay after the initial play-all, before the first pass.
    pub startup_settle: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            check_interval: DEFAULT_CHECK_INTERVAL,
            player_id: DEFAULT_PLAYER_ID,
            request_timeout: None,
            startup_settle: DEFAULT_STARTUP_SETTLE,
        }
    }
}

impl SyncSettings {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.threshold.is_zero() {
            return Err(SyncError::InvalidSetting(
                "threshold",
                "must be greater than zero".into(),
            ));
        }
        if self.check_interval.is_zero() {
            return Err(SyncError::InvalidSetting(
                "check_interval",
                "must be greater than zero".into(),
            ));
        }
        if self.player_id < 0 {
            return Err(SyncError::InvalidSetting(
                "player_id",
                format!("{} is not a Kodi player id", self.player_id),
            ));
        }
        Ok(())
    }
}

#[cfg(feature = "pmoconfig")]
mod config_ext {
    use std::time::Duration;

    use anyhow::Result;
    use pmoconfig::Config;

    use super::SyncSettings;

    impl SyncSettings {
        /// Reads the `sync` section of the configuration.
        pub fn from_config(config: &Config) -> Result<Self> {
            let request_timeout_ms = config.get_sync_request_timeout_ms()?;
            let settings = Self {
                threshold: Duration::from_millis(config.get_sync_threshold_ms()?),
                check_interval: Duration::from_millis(config.get_sync_check_interval_ms()?),
                player_id: config.get_sync_player_id()?,
                request_timeout: (request_timeout_ms > 0)
                    .then(|| Duration::from_millis(request_timeout_ms)),
                startup_settle: Duration::from_millis(config.get_sync_startup_settle_ms()?),
            };
            settings.validate()?;
            Ok(settings)
        }
    }
}
