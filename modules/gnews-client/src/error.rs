use thiserror::Error;

pub type Result<T> = std::result::Result<T, GnewsError>;

#[derive(Error, Debug)]
pub enum GnewsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Google News API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not a Google News URL: {0}")]
    NotAggregatorUrl(String),

    #[error("Failed to decode redirect: {0}")]
    Decode(String),
}
