use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("protocol error: {0}")]
    Protocol(#[from] hyquery_protocol::ProtocolError),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("coordinator startup failed: {0}")]
    Startup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
