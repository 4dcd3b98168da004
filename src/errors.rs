use thiserror::Error;

/// Errors surfaced by the guidance core.
///
/// Per-frame processing never returns these: a bad frame degrades to a
/// "no detection" verdict instead. They appear at construction and
/// configuration time, and in the config file helpers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuideError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Configuration file error: {0}")]
    ConfigIo(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl GuideError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        GuideError::InvalidConfig(message.into())
    }

    pub fn invalid_frame(message: impl Into<String>) -> Self {
        GuideError::InvalidFrame(message.into())
    }
}
