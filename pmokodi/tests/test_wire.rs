use std::time::Duration;

use pmokodi::methods::{self, PlayerProperty};
use pmokodi::{Inbound, PlayerProperties};
use serde_json::{Value, json};

#[test]
fn test_get_properties_round_trip() {
    let request = methods::get_properties(methods::DEFAULT_PLAYER_ID, &[PlayerProperty::Time]).with_id(42);
    let encoded: Value = serde_json::from_str(&request.to_json().unwrap()).unwrap();
    assert_eq!(encoded["jsonrpc"], "2.0");
    assert_eq!(encoded["method"], "Player.GetProperties");
    assert_eq!(encoded["id"], 42);
    assert_eq!(encoded["params"]["properties"], json!(["time"]));

    let reply = json!({
        "jsonrpc": "2.0",
        "id": 42,
        "result": {"time": {"hours": 1, "minutes": 2, "seconds": 3}},
    })
    .to_string();

    let Inbound::Response(response) = Inbound::decode(&reply).unwrap() else {
        panic!("expected a response");
    };
    assert_eq!(response.id, request.id);

    let properties: PlayerProperties = serde_json::from_value(response.result.unwrap()).unwrap();
    assert_eq!(
        properties.time.unwrap().to_duration().unwrap(),
        Duration::from_secs(3723)
    );
    assert_eq!(properties.speed, None);
}

#[test]
fn test_kodi_pause_notification_shape() {
    let frame = r#"{"jsonrpc":"2.0","method":"Player.OnPause","params":{"data":{"item":{"id":4,"type":"movie"},"player":{"playerid":1,"speed":0}},"sender":"xbmc"}}"#;

    let Inbound::Notification(notification) = Inbound::decode(frame).unwrap() else {
        panic!("expected a notification");
    };
    assert_eq!(
        methods::PlaybackNotification::from_method(&notification.method),
        Some(methods::PlaybackNotification::Paused)
    );
    assert_eq!(notification.params.unwrap()["data"]["player"]["speed"], 0);
}

#[test]
fn test_play_pause_reply_speed() {
    let reply = r#"{"id":7,"jsonrpc":"2.0","result":{"speed":1}}"#;
    let Inbound::Response(response) = Inbound::decode(reply).unwrap() else {
        panic!("expected a response");
    };
    let speed: pmokodi::message::PlayerSpeed = serde_json::from_value(response.result.unwrap()).unwrap();
    assert_eq!(speed.speed, 1);
    assert_eq!(pmokodi::PlayState::from_speed(speed.speed), pmokodi::PlayState::Playing);
}
