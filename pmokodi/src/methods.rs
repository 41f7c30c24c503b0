//! Kodi player methods and notifications used by the synchronization engine.

use serde_json::json;

use crate::message::RpcCall;

pub const PLAYER_GET_PROPERTIES: &str = "Player.GetProperties";
pub const PLAYER_PLAY_PAUSE: &str = "Player.PlayPause";

pub const ON_PAUSE: &str = "Player.OnPause";
pub const ON_RESUME: &str = "Player.OnResume";

/// Default Kodi player id (the video player).
pub const DEFAULT_PLAYER_ID: i64 = 1;

/// Player properties the engine knows how to record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerProperty {
    Time,
    Speed,
}

impl PlayerProperty {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerProperty::Time => "time",
            PlayerProperty::Speed => "speed",
        }
    }
}

/// The two notifications that reflect a play/pause change on a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackNotification {
    Paused,
    Resumed,
}

impl PlaybackNotification {
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            ON_PAUSE => Some(PlaybackNotification::Paused),
            ON_RESUME => Some(PlaybackNotification::Resumed),
            _ => None,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            PlaybackNotification::Paused => ON_PAUSE,
            PlaybackNotification::Resumed => ON_RESUME,
        }
    }
}

pub fn get_properties(player_id: i64, properties: &[PlayerProperty]) -> RpcCall {
    let names: Vec<&str> = properties.iter().map(PlayerProperty::as_str).collect();
    RpcCall::new(
        PLAYER_GET_PROPERTIES,
        Some(json!({
            "playerid": player_id,
            "properties": names,
        })),
    )
}

pub fn play_pause(player_id: i64, play: bool) -> RpcCall {
    RpcCall::new(
        PLAYER_PLAY_PAUSE,
        Some(json!({
            "playerid": player_id,
            "play": play,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_properties_params() {
        let call = get_properties(1, &[PlayerProperty::Time, PlayerProperty::Speed]);
        assert_eq!(call.method, PLAYER_GET_PROPERTIES);
        assert_eq!(
            call.params,
            Some(json!({"playerid": 1, "properties": ["time", "speed"]}))
        );
    }

    #[test]
    fn test_play_pause_params() {
        let call = play_pause(DEFAULT_PLAYER_ID, false);
        assert_eq!(call.method, PLAYER_PLAY_PAUSE);
        assert_eq!(call.params, Some(json!({"playerid": 1, "play": false})));
    }

    #[test]
    fn test_playback_notification_mapping() {
        assert_eq!(
            PlaybackNotification::from_method("Player.OnPause"),
            Some(PlaybackNotification::Paused)
        );
        assert_eq!(
            PlaybackNotification::from_method("Player.OnResume"),
            Some(PlaybackNotification::Resumed)
        );
        assert_eq!(PlaybackNotification::from_method("Player.OnSeek"), None);
        assert_eq!(PlaybackNotification::Resumed.method(), ON_RESUME);
    }
}
