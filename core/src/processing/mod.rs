pub mod bulk;
pub mod ingest;
pub mod ranking;

pub use bulk::BulkAccess;
pub use ingest::{IngestProcessor, TIMESTAMP_TO_SECONDS};
pub use ranking::{RankingEngine, TiePolicy};
