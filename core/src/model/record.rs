use crate::model::Detection;
use serde::{Deserialize, Serialize};

/// Telemetry submission as sent by a device and as persisted.
///
/// `rate` is derived at ingestion; whatever the client sends is overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub mac: String,
    #[serde(default, alias = "timestamp")]
    pub submitted_at: String,
    pub sensor: String,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub rate: f64,
}

impl Record {
    pub fn new(
        mac: impl Into<String>,
        submitted_at: impl Into<String>,
        sensor: impl Into<String>,
        detections: Vec<Detection>,
    ) -> Self {
        Self {
            mac: mac.into(),
            submitted_at: submitted_at.into(),
            sensor: sensor.into(),
            detections,
            rate: 0.0,
        }
    }

    pub fn summary(&self) -> RateSummary {
        RateSummary {
            mac: self.mac.clone(),
            rate: self.rate,
        }
    }
}

/// Projection of a record carrying only what ranking needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSummary {
    pub mac: String,
    pub rate: f64,
}

impl RateSummary {
    pub fn sort_key(&self) -> (f64, &str) {
        (self.rate, self.mac.as_str())
    }
}

/// Position of a device among all devices reporting one sensor type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub ranking: usize,
    pub rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accepts_legacy_timestamp_field_and_missing_rate() {
        let body = r#"{
            "mac": "AA:BB",
            "timestamp": "2017-03-01T10:00:00Z",
            "sensor": "temp",
            "detections": [{"values": [1.0], "timestamp": 0}]
        }"#;
        let record: Record = serde_json::from_str(body).unwrap();
        assert_eq!(record.submitted_at, "2017-03-01T10:00:00Z");
        assert_eq!(record.rate, 0.0);
        assert_eq!(record.detections.len(), 1);
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = Record::new("AA:BB", "now", "temp", vec![]);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["submittedAt"], "now");
        assert!(json.get("submitted_at").is_none());
    }
}
