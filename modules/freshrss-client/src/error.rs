use thiserror::Error;

pub type Result<T> = std::result::Result<T, FreshRssError>;

#[derive(Error, Debug)]
pub enum FreshRssError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("FreshRSS API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("FreshRSS authentication failed")]
    Auth,

    #[error("Failed to parse FreshRSS response: {0}")]
    Parse(String),
}
