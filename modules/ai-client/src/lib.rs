pub mod claude;
pub mod error;
pub mod gemini;
pub mod image_strategy;
pub mod openai;
pub mod traits;
pub mod util;

pub use claude::ClaudeAgent;
pub use error::{AiError, Result};
pub use gemini::{GeminiAgent, GeminiImageModel};
pub use image_strategy::{GeneratedImage, ImageGenerator};
pub use openai::OpenAiImageModel;
pub use traits::{Classifier, ClassifierMatch, ImageModel, TextModel, TextRequest};
