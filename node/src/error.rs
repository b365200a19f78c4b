use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("network error: {0}")]
    Network(#[from] hyquery_network::NetworkError),

    #[error("protocol error: {0}")]
    Protocol(#[from] hyquery_protocol::ProtocolError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
