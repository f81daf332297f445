use serde::{Deserialize, Serialize};

/// One sample event: readings captured together at a single timestamp.
///
/// `timestamp` is in microseconds; see
/// [`TIMESTAMP_TO_SECONDS`](crate::processing::ingest::TIMESTAMP_TO_SECONDS).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub values: Vec<f64>,
    pub timestamp: f64,
}

impl Detection {
    pub fn new(values: Vec<f64>, timestamp: f64) -> Self {
        Self { values, timestamp }
    }
}
