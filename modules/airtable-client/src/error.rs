use thiserror::Error;

pub type Result<T> = std::result::Result<T, AirtableError>;

#[derive(Error, Debug)]
pub enum AirtableError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Airtable API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Airtable rate limited: {message}")]
    RateLimited { message: String },

    #[error("Airtable authentication failed")]
    Auth,

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Failed to parse Airtable response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl AirtableError {
    /// Transient errors are retried by the client; auth and input errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AirtableError::Http(e) => e.is_timeout() || e.is_connect(),
            AirtableError::Api { status, .. } => *status >= 500,
            AirtableError::RateLimited { .. } => true,
            AirtableError::Auth | AirtableError::InvalidInput(_) | AirtableError::Parse(_) => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AirtableError::RateLimited { .. })
    }

    pub(crate) fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => AirtableError::Auth,
            429 => AirtableError::RateLimited { message },
            422 => AirtableError::InvalidInput(message),
            _ => AirtableError::Api { status, message },
        }
    }
}
