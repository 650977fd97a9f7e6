use crate::config::ConfigError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("authentication timed out after {0:?}")]
    AuthTimeout(Duration),
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, &'static str),
    #[error("server error: {0}")]
    Server(String),
    #[error("connection to server closed")]
    Disconnected,
    #[error(transparent)]
    Config(#[from] ConfigError),
}
