use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserbaseError>;

#[derive(Error, Debug)]
pub enum BrowserbaseError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Browserbase API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Browserbase authentication failed")]
    Auth,

    #[error("Failed to parse Browserbase response: {0}")]
    Parse(#[from] serde_json::Error),
}
