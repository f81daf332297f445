//! Record Store capability consumed by the ingestion and ranking paths.
//!
//! Write serialization is the store's responsibility; callers hold no locks.

pub mod jsonl;
pub mod memory;
pub mod query;
pub mod ticket;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;
pub use query::{Document, Filter, Projection, SortSpec};
pub use ticket::InsertTicket;

use crate::model::Record;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store call exceeded {0:?}")]
    Timeout(Duration),
    #[error("store I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt record at line {line}: {source}")]
    Corrupt {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("encoding failure: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("insert abandoned before commit")]
    Abandoned,
    #[error("append failed ({write}) and rollback failed ({truncate})")]
    RollbackFailed {
        write: std::io::Error,
        truncate: std::io::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable collection of submitted records.
pub trait RecordStore: Send + Sync {
    /// Persists one record. Either the whole record is stored or nothing is.
    ///
    /// Implementations claim `ticket` while holding their write lock and
    /// immediately before mutating; a ticket that cannot be claimed yields
    /// [`StoreError::Abandoned`] with nothing written.
    fn insert(&self, record: &Record, ticket: &InsertTicket) -> StoreResult<()>;
    fn find_by(
        &self,
        filter: &Filter,
        projection: Projection,
        sort: Option<SortSpec>,
    ) -> StoreResult<Vec<Document>>;
    /// Removes every record and returns how many were removed.
    fn remove_all(&self) -> StoreResult<usize>;
}
