use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum StashError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported content: {0}")]
    UnsupportedContent(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Other(String),
}

impl StashError {
    /// Outcomes that degrade to an absent value instead of failing a batch.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            StashError::NotFound(_) | StashError::UnsupportedContent(_) | StashError::Parse(_)
        )
    }

    pub fn is_not_found_status(&self) -> bool {
        matches!(self, StashError::Status { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, StashError>;
