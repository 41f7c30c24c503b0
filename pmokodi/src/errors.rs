use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum KodiError {
    #[error("Websocket error on {0}: {1}")]
    Websocket(String, #[source] tungstenite::Error),
    #[error("Invalid authorization header for {0}")]
    InvalidCredentials(String),
    #[error("Connection to {0} is closed")]
    ConnectionClosed(String),
    #[error("Malformed JSON-RPC message: {0}")]
    Decode(String),
    #[error("JSON-RPC error {code} from {node}: {message}")]
    Rpc {
        node: String,
        code: i64,
        message: String,
    },
    #[error("Request id {0} is already pending")]
    DuplicateId(u64),
    #[error("Missing {0} in response result")]
    MissingField(&'static str),
    #[error("Request {0} timed out")]
    Timeout(String),
}

impl KodiError {
    pub fn decode(message: impl Into<String>) -> Self {
        KodiError::Decode(message.into())
    }

    /// True when the error means the node cannot be used anymore.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            KodiError::ConnectionClosed(_) | KodiError::Websocket(_, _)
        )
    }
}

impl From<serde_json::Error> for KodiError {
    fn from(err: serde_json::Error) -> Self {
        KodiError::Decode(err.to_string())
    }
}
