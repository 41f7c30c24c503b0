//! JSON-RPC 2.0 envelopes exchanged with a Kodi node.
//!
//! Outgoing calls are built without an identifier ([`RpcCall`]); the
//! [`NodeClient`](crate::NodeClient) numbers them when they are accepted,
//! producing the [`RpcRequest`] that goes on the wire. Incoming frames are
//! decoded into [`Inbound`], which separates spontaneous notifications from
//! responses to earlier requests.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::KodiError;

pub const JSONRPC_VERSION: &str = "2.0";

/// A method call that has not been assigned an identifier yet.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcCall {
    pub method: String,
    pub params: Option<Value>,
}

impl RpcCall {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    pub fn with_id(self, id: u64) -> RpcRequest {
        RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            method: self.method,
            params: self.params,
            id,
        }
    }
}

/// Request as written on the connection.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: u64,
}

impl RpcRequest {
    pub fn to_json(&self) -> Result<String, KodiError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RpcResponse {
    pub id: u64,
    pub result: Option<Value>,
    pub error: Option<RpcErrorObject>,
}

/// Server-pushed event, not tied to any request.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Notification(Notification),
    Response(RpcResponse),
}

/// Raw shape shared by every incoming frame.
#[derive(Debug, Deserialize)]
struct RawInbound {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
    #[serde(default)]
    id: Option<Value>,
}

impl Inbound {
    pub fn decode(text: &str) -> Result<Self, KodiError> {
        let raw: RawInbound = serde_json::from_str(text)?;

        if let Some(version) = raw.jsonrpc.as_deref() {
            if version != JSONRPC_VERSION {
                return Err(KodiError::decode(format!(
                    "unsupported jsonrpc version {version}"
                )));
            }
        }

        match raw.id {
            None | Some(Value::Null) => match raw.method {
                Some(method) => Ok(Inbound::Notification(Notification {
                    method,
                    params: raw.params,
                })),
                None => Err(KodiError::decode(
                    "message has neither an id nor a method",
                )),
            },
            Some(Value::Number(n)) => {
                let id = n
                    .as_u64()
                    .ok_or_else(|| KodiError::decode(format!("invalid response id {n}")))?;
                Ok(Inbound::Response(RpcResponse {
                    id,
                    result: raw.result,
                    error: raw.error,
                }))
            }
            Some(other) => Err(KodiError::decode(format!(
                "unsupported response id {other}"
            ))),
        }
    }
}

/// `time` property returned by `Player.GetProperties`.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PlayerTime {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    #[serde(default)]
    pub milliseconds: u64,
}

impl PlayerTime {
    /// Fails with [`KodiError::Decode`] when the fields overflow a `Duration`.
    pub fn to_duration(&self) -> Result<Duration, KodiError> {
        let seconds = self
            .hours
            .checked_mul(3600)
            .and_then(|s| s.checked_add(self.minutes.checked_mul(60)?))
            .and_then(|s| s.checked_add(self.seconds))
            .ok_or_else(|| KodiError::decode(format!("player time out of range: {self:?}")))?;
        Duration::from_secs(seconds)
            .checked_add(Duration::from_millis(self.milliseconds))
            .ok_or_else(|| KodiError::decode(format!("player time out of range: {self:?}")))
    }

    pub fn from_duration(duration: Duration) -> Self {
        let total = duration.as_secs();
        Self {
            hours: total / 3600,
            minutes: (total % 3600) / 60,
            seconds: total % 60,
            milliseconds: u64::from(duration.subsec_millis()),
        }
    }
}

/// `result` of `Player.GetProperties`, restricted to what the engine asks for.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct PlayerProperties {
    #[serde(default)]
    pub time: Option<PlayerTime>,
    #[serde(default)]
    pub speed: Option<i64>,
}

/// `result` of `Player.PlayPause`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct PlayerSpeed {
    pub speed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization_skips_missing_params() {
        let request = RpcCall::new("JSONRPC.Ping", None).with_id(7);
        let value: Value = serde_json::from_str(&request.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "method": "JSONRPC.Ping", "id": 7})
        );
    }

    #[test]
    fn test_decode_notification_without_id() {
        let text = r#"{"jsonrpc":"2.0","method":"Player.OnPause","params":{"sender":"xbmc"}}"#;
        match Inbound::decode(text).unwrap() {
            Inbound::Notification(n) => {
                assert_eq!(n.method, "Player.OnPause");
                assert_eq!(n.params, Some(json!({"sender": "xbmc"})));
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_notification_with_null_id() {
        let text = r#"{"jsonrpc":"2.0","method":"Player.OnResume","id":null}"#;
        assert!(matches!(
            Inbound::decode(text).unwrap(),
            Inbound::Notification(_)
        ));
    }

    #[test]
    fn test_decode_error_response() {
        let text = r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32602,"message":"Invalid params."}}"#;
        match Inbound::decode(text).unwrap() {
            Inbound::Response(r) => {
                assert_eq!(r.id, 3);
                assert!(r.result.is_none());
                assert_eq!(r.error.unwrap().code, -32602);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Inbound::decode("not json").is_err());
        assert!(Inbound::decode(r#"{"jsonrpc":"2.0"}"#).is_err());
        assert!(Inbound::decode(r#"{"jsonrpc":"2.0","id":"abc","result":1}"#).is_err());
        assert!(Inbound::decode(r#"{"jsonrpc":"1.0","id":1,"result":1}"#).is_err());
        assert!(Inbound::decode(r#"{"jsonrpc":"2.0","id":-4,"result":1}"#).is_err());
    }

    #[test]
    fn test_player_time_to_duration() {
        let time = PlayerTime {
            hours: 1,
            minutes: 2,
            seconds: 3,
            milliseconds: 0,
        };
        assert_eq!(time.to_duration().unwrap(), Duration::from_secs(3723));

        let with_ms: PlayerTime =
            serde_json::from_value(json!({"hours": 0, "minutes": 0, "seconds": 1, "milliseconds": 250}))
                .unwrap();
        assert_eq!(with_ms.to_duration().unwrap(), Duration::from_millis(1250));
    }

    #[test]
    fn test_player_time_out_of_range() {
        let huge = PlayerTime {
            hours: u64::MAX,
            minutes: 0,
            seconds: 0,
            milliseconds: 0,
        };
        assert!(matches!(huge.to_duration(), Err(KodiError::Decode(_))));

        let last_second = PlayerTime {
            hours: 0,
            minutes: 0,
            seconds: u64::MAX,
            milliseconds: 1000,
        };
        assert!(last_second.to_duration().is_err());
    }

    #[test]
    fn test_player_time_from_duration() {
        let time = PlayerTime::from_duration(Duration::from_millis(3_723_500));
        assert_eq!(
            time,
            PlayerTime {
                hours: 1,
                minutes: 2,
                seconds: 3,
                milliseconds: 500
            }
        );
    }
}
