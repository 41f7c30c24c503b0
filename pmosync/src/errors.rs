use pmokodi::KodiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No node available")]
    NoNodes,
    #[error("Invalid sync setting {0}: {1}")]
    InvalidSetting(&'static str, String),
    #[error("Node error: {0}")]
    Node(#[from] KodiError),
    #[error("Logging setup failed: {0}")]
    Logging(String),
}
