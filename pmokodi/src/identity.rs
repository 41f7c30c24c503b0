use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Identifies a node inside the pool (its host, as configured).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection credentials of one Kodi node.
#[derive(Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    /// `hostname[:port]` of the Kodi websocket server
    pub host: String,
    pub user: String,
    pub password: String,
}

impl NodeIdentity {
    pub fn new(host: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn id(&self) -> NodeId {
        NodeId(self.host.clone())
    }

    pub fn ws_uri(&self) -> String {
        format!("ws://{}/jsonrpc", self.host)
    }

    /// Value of the `Authorization` header sent during the handshake.
    pub fn authorization(&self) -> String {
        let credentials = format!("{}:{}", self.user, self.password);
        format!("Basic {}", STANDARD.encode(credentials))
    }

    pub fn description(&self) -> String {
        format!("{} ({})", self.host, self.user)
    }
}

// The password never shows up in logs.
impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("host", &self.host)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}
