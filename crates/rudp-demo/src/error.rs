use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] crate::config::error::ConfigError),
    #[error(transparent)]
    Transport(#[from] rudp_core::TransportError),
    #[error("failed to install logger: {0}")]
    Logger(#[from] log::SetLoggerError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
