pub mod config;
pub mod error;
pub mod fingerprint;
pub mod schedule;
pub mod sources;
pub mod types;

pub use config::Config;
pub use error::PivotError;
pub use fingerprint::{canonicalize, fingerprint, is_aggregator_url, is_blocked};
pub use sources::source_from_url;
pub use types::{
    Article, ArchiveRow, FinalIssue, FitStatus, ImageStatus, Issue, IssueStatus, IssueStory,
    NewsletterVariant, PrefilterRow, Select, SlotRef,
};
