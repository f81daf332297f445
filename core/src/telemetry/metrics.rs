use std::sync::Mutex;

/// Process-local counters for the ingestion and ranking paths.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ingested: usize,
    pub rejected: usize,
    pub rank_queries: usize,
    pub rank_misses: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_ingested(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.ingested += 1;
        }
    }

    pub fn record_rejected(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.rejected += 1;
        }
    }

    pub fn record_rank_query(&self, hit: bool) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.rank_queries += 1;
            if !hit {
                metrics.rank_misses += 1;
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner
            .lock()
            .map(|metrics| *metrics)
            .unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
