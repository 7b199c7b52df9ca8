use thiserror::Error;

pub type Result<T> = std::result::Result<T, CloudflareImagesError>;

#[derive(Error, Debug)]
pub enum CloudflareImagesError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cloudflare Images API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Image id already exists: {id}")]
    Conflict { id: String },

    #[error("Cloudflare Images response carried no variant URL")]
    NoVariant,
}

impl CloudflareImagesError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, CloudflareImagesError::Conflict { .. })
    }
}
