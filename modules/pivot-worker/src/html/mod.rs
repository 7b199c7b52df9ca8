pub mod escape;
pub mod pivot5;
pub mod signal;
pub mod stripper;

pub use escape::{escape_html, format_bullet_list};
