use thiserror::Error;

/// Fall detection error types
#[derive(Error, Debug, Clone)]
pub enum FallDetectionError {
    #[error("Sensor failed: {0}")]
    SensorFailed(String),

    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Location permission denied")]
    PermissionDenied,

    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("API returned HTTP {status}: {body}")]
    ApiStatus { status: u16, body: String },

    #[error("API rejected request: {0}")]
    Rejected(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for FallDetectionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FallDetectionError::ApiError(format!("timed out: {}", err))
        } else {
            FallDetectionError::ApiError(err.to_string())
        }
    }
}

impl From<std::io::Error> for FallDetectionError {
    fn from(err: std::io::Error) -> Self {
        FallDetectionError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for FallDetectionError {
    fn from(err: serde_json::Error) -> Self {
        FallDetectionError::StorageError(format!("invalid JSON: {}", err))
    }
}

/// Result type for fall detection operations
pub type FResult<T> = Result<T, FallDetectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FallDetectionError::ApiStatus {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "API returned HTTP 502: bad gateway");
        assert_eq!(
            FallDetectionError::PermissionDenied.to_string(),
            "Location permission denied"
        );
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        match FallDetectionError::from(io) {
            FallDetectionError::StorageError(msg) => assert!(msg.contains("missing")),
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
