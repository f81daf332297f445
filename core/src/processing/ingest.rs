use crate::model::{Detection, Record};
use crate::prelude::{DeviceError, DeviceResult};
use crate::store::{InsertTicket, RecordStore};
use crate::telemetry::log::LogManager;

/// Converts detection timestamps (microseconds) to seconds.
///
/// Rates are therefore detections per second. Devices must report
/// microsecond timestamps; confirm the unit with the firmware before
/// changing this value.
pub const TIMESTAMP_TO_SECONDS: f64 = 1.0e-6;

/// Validates a submitted batch, derives its rate and persists it.
pub struct IngestProcessor {
    logger: LogManager,
}

impl IngestProcessor {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new("ingest"),
        }
    }

    /// Overwrites `batch.rate` and inserts the batch. Nothing is written on
    /// any error path.
    pub fn ingest(&self, store: &dyn RecordStore, batch: Record) -> DeviceResult<Record> {
        self.ingest_with(store, batch, &InsertTicket::new())
    }

    /// Like [`ingest`](Self::ingest), but the insert only commits if
    /// `ticket` has not been abandoned by then.
    pub fn ingest_with(
        &self,
        store: &dyn RecordStore,
        mut batch: Record,
        ticket: &InsertTicket,
    ) -> DeviceResult<Record> {
        validate(&batch)?;
        batch.rate = self.compute_rate(&batch.detections)?;

        store.insert(&batch, ticket)?;
        self.logger.record(&format!(
            "stored {} / {} rate {:.6} Hz",
            batch.mac, batch.sensor, batch.rate
        ));
        Ok(batch)
    }

    /// Detections per second across the span from the first to the last
    /// detection. Detections are taken in submitted order.
    pub fn compute_rate(&self, detections: &[Detection]) -> DeviceResult<f64> {
        let (first, last) = match (detections.first(), detections.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(DeviceError::Validation("batch has no detections".into())),
        };

        let count = detections.len();
        let start_s = first.timestamp * TIMESTAMP_TO_SECONDS;
        let stop_s = last.timestamp * TIMESTAMP_TO_SECONDS;
        let duration = stop_s - start_s;
        self.logger.detail(&format!(
            "detections {} start {:.6}s stop {:.6}s period {:.6}s",
            count, start_s, stop_s, duration
        ));

        if duration < 0.0 {
            return Err(DeviceError::Validation(format!(
                "last detection ({stop_s}s) precedes first ({start_s}s)"
            )));
        }
        if duration == 0.0 {
            return Err(DeviceError::DegenerateInterval { start_s, stop_s });
        }

        let rate = count as f64 / duration;
        if !rate.is_finite() {
            return Err(DeviceError::DegenerateInterval { start_s, stop_s });
        }
        Ok(rate)
    }
}

impl Default for IngestProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(batch: &Record) -> DeviceResult<()> {
    if batch.mac.trim().is_empty() {
        return Err(DeviceError::Validation("mac is required".into()));
    }
    if batch.sensor.trim().is_empty() {
        return Err(DeviceError::Validation("sensor is required".into()));
    }
    if batch.detections.is_empty() {
        return Err(DeviceError::Validation("batch has no detections".into()));
    }
    if let Some(bad) = batch.detections.iter().find(|d| !d.timestamp.is_finite()) {
        return Err(DeviceError::Validation(format!(
            "non-finite detection timestamp {}",
            bad.timestamp
        )));
    }
    Ok(())
}
