use thiserror::Error;

pub type Result<T> = std::result::Result<T, AiError>;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("Authentication failed")]
    Auth,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream contract violation: {0}")]
    Upstream(String),
}

impl AiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::Http(e) => e.is_timeout() || e.is_connect(),
            AiError::Api { status, .. } => *status >= 500,
            AiError::RateLimited { .. } => true,
            // A glitched response on one attempt may parse on the next.
            AiError::Upstream(_) => true,
            AiError::Auth | AiError::InvalidInput(_) => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AiError::RateLimited { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, AiError::Auth)
    }

    pub(crate) fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => AiError::Auth,
            429 => AiError::RateLimited { message },
            400 | 422 => AiError::InvalidInput(message),
            _ => AiError::Api { status, message },
        }
    }
}
