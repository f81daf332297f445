use crate::model::Record;
use crate::store::query::{self, Document, Filter, Projection, SortSpec};
use crate::store::{InsertTicket, RecordStore, StoreError, StoreResult};
use std::sync::RwLock;

/// Volatile store kept entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, record: &Record, ticket: &InsertTicket) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        if !ticket.claim() {
            return Err(StoreError::Abandoned);
        }
        records.push(record.clone());
        Ok(())
    }

    fn find_by(
        &self,
        filter: &Filter,
        projection: Projection,
        sort: Option<SortSpec>,
    ) -> StoreResult<Vec<Document>> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(query::apply(records.iter(), filter, projection, sort))
    }

    fn remove_all(&self) -> StoreResult<usize> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        let removed = records.len();
        records.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Detection;

    #[test]
    fn memory_store_keeps_duplicates_and_clears() {
        let store = MemoryStore::new();
        let record = Record::new("AA:BB", "t0", "temp", vec![Detection::new(vec![1.0], 0.0)]);
        store.insert(&record, &InsertTicket::new()).unwrap();
        store.insert(&record, &InsertTicket::new()).unwrap();
        assert_eq!(store.len(), 2);

        let abandoned = InsertTicket::new();
        assert!(abandoned.abandon());
        assert!(matches!(
            store.insert(&record, &abandoned),
            Err(StoreError::Abandoned)
        ));
        assert_eq!(store.len(), 2);

        let docs = store
            .find_by(&Filter::all(), Projection::Full, None)
            .unwrap();
        assert_eq!(docs[0].clone().into_record(), Some(record));

        assert_eq!(store.remove_all().unwrap(), 2);
        assert!(store.is_empty());
    }
}
