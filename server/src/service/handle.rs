use crate::service::config::{ServerConfig, StoreBackend};
use anyhow::Context;
use devicecore::store::{InsertTicket, JsonlStore, MemoryStore};
use devicecore::telemetry::MetricsRecorder;
use devicecore::{
    BulkAccess, DeviceError, DeviceResult, IngestProcessor, RankingEngine, Ranking, Record,
    RecordStore, StoreError,
};
use std::sync::Arc;
use std::time::Duration;

/// Shared entry point for every request. Cloning is cheap; the store is the
/// only shared mutable state and serializes writes itself.
#[derive(Clone)]
pub struct SpecService {
    store: Arc<dyn RecordStore>,
    ingest: Arc<IngestProcessor>,
    ranking: Arc<RankingEngine>,
    bulk: Arc<BulkAccess>,
    metrics: Arc<MetricsRecorder>,
    timeout: Duration,
}

impl SpecService {
    pub fn new(store: Arc<dyn RecordStore>, ranking: RankingEngine, timeout: Duration) -> Self {
        Self {
            store,
            ingest: Arc::new(IngestProcessor::new()),
            ranking: Arc::new(ranking),
            bulk: Arc::new(BulkAccess::new()),
            metrics: Arc::new(MetricsRecorder::new()),
            timeout,
        }
    }

    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn RecordStore> = match &config.store {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Jsonl { path } => Arc::new(
                JsonlStore::open(path)
                    .with_context(|| format!("opening record file {}", path.display()))?,
            ),
        };
        Ok(Self::new(
            store,
            RankingEngine::new(config.tie_policy),
            config.store_timeout(),
        ))
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub async fn ingest(&self, batch: Record) -> DeviceResult<Record> {
        let ingest = self.ingest.clone();
        let ticket = Arc::new(InsertTicket::new());
        let store_ticket = ticket.clone();
        let result = self
            .run_bounded(
                move |store| ingest.ingest_with(store, batch, &store_ticket),
                Some(ticket),
            )
            .await;
        match &result {
            Ok(_) => self.metrics.record_ingested(),
            Err(_) => self.metrics.record_rejected(),
        }
        result
    }

    pub async fn rank(&self, sensor: String, mac: String) -> DeviceResult<Option<Ranking>> {
        let ranking = self.ranking.clone();
        let result = self
            .with_store(move |store| ranking.rank(store, &sensor, &mac))
            .await;
        if let Ok(found) = &result {
            self.metrics.record_rank_query(found.is_some());
        }
        result
    }

    pub async fn list(&self) -> DeviceResult<Vec<Record>> {
        let bulk = self.bulk.clone();
        self.with_store(move |store| bulk.list(store)).await
    }

    pub async fn delete_all(&self) -> DeviceResult<usize> {
        let bulk = self.bulk.clone();
        self.with_store(move |store| bulk.delete_all(store)).await
    }

    async fn with_store<T, F>(&self, op: F) -> DeviceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RecordStore) -> DeviceResult<T> + Send + 'static,
    {
        self.run_bounded(op, None).await
    }

    /// Runs a synchronous store operation on the blocking pool, bounded by
    /// the configured timeout.
    ///
    /// Without a ticket an overrunning operation keeps running in the
    /// background and its result is discarded. With a ticket, the timeout
    /// abandons it: if the store has not claimed the ticket yet nothing will
    /// be written, otherwise the commit is already under way and its result
    /// is awaited and returned.
    async fn run_bounded<T, F>(
        &self,
        op: F,
        ticket: Option<Arc<InsertTicket>>,
    ) -> DeviceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RecordStore) -> DeviceResult<T> + Send + 'static,
    {
        let store = self.store.clone();
        let mut task = tokio::task::spawn_blocking(move || op(store.as_ref()));
        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(joined) => flatten(joined),
            Err(_) => match ticket {
                Some(ticket) if !ticket.abandon() => flatten(task.await),
                _ => Err(DeviceError::Store(StoreError::Timeout(self.timeout))),
            },
        }
    }
}

fn flatten<T>(joined: Result<DeviceResult<T>, tokio::task::JoinError>) -> DeviceResult<T> {
    joined.unwrap_or_else(|join_err| {
        Err(DeviceError::Store(StoreError::Unavailable(format!(
            "store task failed: {join_err}"
        ))))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use devicecore::store::{Document, Filter, Projection, SortSpec, StoreResult};
    use std::thread;
    use devicecore::{Detection, TiePolicy};

    struct StalledStore;

    impl RecordStore for StalledStore {
        fn insert(&self, _record: &Record, _ticket: &InsertTicket) -> StoreResult<()> {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        }
        fn find_by(
            &self,
            _filter: &Filter,
            _projection: Projection,
            _sort: Option<SortSpec>,
        ) -> StoreResult<Vec<Document>> {
            thread::sleep(Duration::from_millis(500));
            Ok(Vec::new())
        }
        fn remove_all(&self) -> StoreResult<usize> {
            Ok(0)
        }
    }

    /// Memory store whose inserts are slow either before or after committing.
    struct SlowCommitStore {
        inner: MemoryStore,
        before_commit: Duration,
        after_commit: Duration,
    }

    impl SlowCommitStore {
        fn new(before_commit: Duration, after_commit: Duration) -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryStore::new(),
                before_commit,
                after_commit,
            })
        }
    }

    impl RecordStore for SlowCommitStore {
        fn insert(&self, record: &Record, ticket: &InsertTicket) -> StoreResult<()> {
            thread::sleep(self.before_commit);
            self.inner.insert(record, ticket)?;
            thread::sleep(self.after_commit);
            Ok(())
        }
        fn find_by(
            &self,
            filter: &Filter,
            projection: Projection,
            sort: Option<SortSpec>,
        ) -> StoreResult<Vec<Document>> {
            self.inner.find_by(filter, projection, sort)
        }
        fn remove_all(&self) -> StoreResult<usize> {
            self.inner.remove_all()
        }
    }

    fn batch(mac: &str, span_us: f64) -> Record {
        Record::new(
            mac,
            "t0",
            "temp",
            vec![
                Detection::new(vec![1.0], 0.0),
                Detection::new(vec![2.0], span_us),
            ],
        )
    }

    fn memory_service() -> SpecService {
        SpecService::new(
            Arc::new(MemoryStore::new()),
            RankingEngine::new(TiePolicy::Shared),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn service_ingests_ranks_and_clears() {
        let service = memory_service();
        service.ingest(batch("AA:BB", 2_000_000.0)).await.unwrap();
        service.ingest(batch("CC:DD", 1_000_000.0)).await.unwrap();

        let ranking = service
            .rank("temp".into(), "AA:BB".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ranking.ranking, 2);
        assert!((ranking.rate - 1.0).abs() < 1e-9);

        assert_eq!(service.list().await.unwrap().len(), 2);
        assert_eq!(service.delete_all().await.unwrap(), 2);
        assert!(service.list().await.unwrap().is_empty());
        assert_eq!(service.metrics().snapshot().ingested, 2);
    }

    #[tokio::test]
    async fn rejected_batches_are_counted() {
        let service = memory_service();
        let err = service.ingest(batch("AA:BB", 0.0)).await.unwrap_err();
        assert_eq!(err.kind(), "DegenerateInterval");
        assert_eq!(service.metrics().snapshot().rejected, 1);
    }

    #[tokio::test]
    async fn slow_store_times_out_as_store_error() {
        let service = SpecService::new(
            Arc::new(StalledStore),
            RankingEngine::default(),
            Duration::from_millis(20),
        );
        let err = service.ingest(batch("AA:BB", 1.0)).await.unwrap_err();
        assert!(matches!(err, DeviceError::Store(StoreError::Timeout(_))));
        let err = service
            .rank("temp".into(), "AA:BB".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "StoreError");
    }

    #[tokio::test]
    async fn timed_out_insert_is_never_committed() {
        let store = SlowCommitStore::new(Duration::from_millis(150), Duration::ZERO);
        let service = SpecService::new(
            store.clone(),
            RankingEngine::default(),
            Duration::from_millis(20),
        );
        let err = service.ingest(batch("AA:BB", 1_000_000.0)).await.unwrap_err();
        assert!(matches!(err, DeviceError::Store(StoreError::Timeout(_))));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(store.inner.is_empty());
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_claimed_before_timeout_reports_success() {
        let store = SlowCommitStore::new(Duration::ZERO, Duration::from_millis(300));
        let service = SpecService::new(
            store.clone(),
            RankingEngine::default(),
            Duration::from_millis(50),
        );
        let stored = service.ingest(batch("AA:BB", 1_000_000.0)).await.unwrap();
        assert_eq!(stored.mac, "AA:BB");
        assert_eq!(store.inner.len(), 1);
        assert_eq!(service.metrics().snapshot().ingested, 1);
    }

    #[tokio::test]
    async fn from_config_opens_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            store: StoreBackend::Jsonl {
                path: dir.path().join("specs.jsonl"),
            },
            ..Default::default()
        };
        let service = SpecService::from_config(&config).unwrap();
        service.ingest(batch("AA:BB", 1_000_000.0)).await.unwrap();
        drop(service);

        let reopened = SpecService::from_config(&config).unwrap();
        assert_eq!(reopened.list().await.unwrap().len(), 1);
    }
}
