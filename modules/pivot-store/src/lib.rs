pub mod airtable;
pub mod backend;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod predicate;
pub mod record;
pub mod store;

pub use backend::{Query, SortOrder, StoreError, Table, TableBackend};
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryBackend;
pub use predicate::Predicate;
pub use record::Record;
pub use store::Store;

pub type Result<T> = std::result::Result<T, StoreError>;
