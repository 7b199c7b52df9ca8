use thiserror::Error;

pub type Result<T> = std::result::Result<T, MauticError>;

#[derive(Error, Debug)]
pub enum MauticError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mautic API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Mautic authentication failed")]
    Auth,

    #[error("Failed to parse Mautic response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl MauticError {
    pub fn is_retryable(&self) -> bool {
        match self {
            MauticError::Http(e) => e.is_timeout() || e.is_connect(),
            MauticError::Api { status, .. } => *status >= 500 || *status == 429,
            MauticError::Auth | MauticError::Parse(_) => false,
        }
    }
}
