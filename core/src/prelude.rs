use crate::store::StoreError;

/// Common error type for ingestion and query operations.
#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    #[error("invalid batch: {0}")]
    Validation(String),
    #[error("zero-length capture span (start {start_s}s, stop {stop_s}s): rate undefined")]
    DegenerateInterval { start_s: f64, stop_s: f64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DeviceError {
    /// Stable name used in error bodies on the HTTP boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceError::Validation(_) => "ValidationError",
            DeviceError::DegenerateInterval { .. } => "DegenerateInterval",
            DeviceError::Store(_) => "StoreError",
        }
    }

    /// Validation and domain errors are raised before any store mutation.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, DeviceError::Store(_))
    }
}

pub type DeviceResult<T> = Result<T, DeviceError>;
