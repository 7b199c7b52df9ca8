use thiserror::Error;

pub type Result<T> = std::result::Result<T, CloudinaryError>;

#[derive(Error, Debug)]
pub enum CloudinaryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cloudinary API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Cloudinary response carried no delivery URL")]
    NoUrl,
}
