use devicecore::DeviceError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            error: kind.to_string(),
            message: message.into(),
        }
    }
}

impl From<&DeviceError> for ErrorBody {
    fn from(err: &DeviceError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemovedBody {
    pub removed: usize,
}
