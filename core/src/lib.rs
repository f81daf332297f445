//! Core ingestion and ranking logic for the device telemetry service.
//!
//! Field devices submit batches of timestamped detections. The ingestion
//! processor derives a detection rate per batch and persists it through a
//! [`store::RecordStore`]; the ranking engine answers where a device sits,
//! by rate, among every device reporting the same sensor type.

pub mod model;
pub mod prelude;
pub mod processing;
pub mod store;
pub mod telemetry;

pub use model::{Detection, RateSummary, Ranking, Record};
pub use prelude::{DeviceError, DeviceResult};
pub use processing::{BulkAccess, IngestProcessor, RankingEngine, TiePolicy};
pub use store::{RecordStore, StoreError};
