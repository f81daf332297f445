use crate::model::Record;
use crate::prelude::DeviceResult;
use crate::store::{Document, Filter, Projection, RecordStore};
use crate::telemetry::log::LogManager;

/// Whole-collection listing and reset.
///
/// Listing is unpaginated and only suitable for small collections.
pub struct BulkAccess {
    logger: LogManager,
}

impl BulkAccess {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new("bulk"),
        }
    }

    pub fn list(&self, store: &dyn RecordStore) -> DeviceResult<Vec<Record>> {
        let documents = store.find_by(&Filter::all(), Projection::Full, None)?;
        Ok(documents
            .into_iter()
            .filter_map(Document::into_record)
            .collect())
    }

    /// Irreversibly removes every record.
    pub fn delete_all(&self, store: &dyn RecordStore) -> DeviceResult<usize> {
        let removed = store.remove_all()?;
        self.logger.warn(&format!("removed all {} records", removed));
        Ok(removed)
    }
}

impl Default for BulkAccess {
    fn default() -> Self {
        Self::new()
    }
}
