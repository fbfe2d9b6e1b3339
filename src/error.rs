use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, TourError>;

/// Everything that can go wrong between the camera and an export package.
///
/// State-machine misuse and configuration errors are programming errors and
/// are reported as-is. Environmental failures (permissions, sensors,
/// geolocation) are normally absorbed by the capture layer before they reach
/// the caller.
#[derive(Debug, Error)]
pub enum TourError {
    /// Bad session or application setup
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Operation requires an active room but the session is elsewhere
    #[error("capture session is not active (state: {state})")]
    SessionNotActive { state: String },

    /// Finalize was called before every room was visited
    #[error("capture session is incomplete (state: {state})")]
    SessionIncomplete { state: String },

    /// Camera was never started or has been released
    #[error("no active camera feed")]
    NoActiveFeed,

    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    /// Image re-encoding or archive packing failed
    #[error("encoding failure: {0}")]
    EncodingFailure(String),

    /// Tour store read or write failed
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// Camera or geolocation access refused by the user or OS
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TourError {
    /// True for errors that indicate a caller bug rather than the environment
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            TourError::InvalidConfiguration(_)
                | TourError::SessionNotActive { .. }
                | TourError::SessionIncomplete { .. }
        )
    }
}

impl From<rusqlite::Error> for TourError {
    fn from(err: rusqlite::Error) -> Self {
        TourError::StorageFailure(err.to_string())
    }
}

impl From<serde_json::Error> for TourError {
    fn from(err: serde_json::Error) -> Self {
        TourError::StorageFailure(format!("serialization: {}", err))
    }
}

impl From<image::ImageError> for TourError {
    fn from(err: image::ImageError) -> Self {
        TourError::EncodingFailure(err.to_string())
    }
}

impl From<zip::result::ZipError> for TourError {
    fn from(err: zip::result::ZipError) -> Self {
        TourError::EncodingFailure(format!("archive: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_misuse_classification() {
        assert!(TourError::SessionNotActive { state: "Idle".into() }.is_misuse());
        assert!(TourError::InvalidConfiguration("empty".into()).is_misuse());
        assert!(!TourError::NoActiveFeed.is_misuse());
        assert!(!TourError::StorageFailure("disk".into()).is_misuse());
    }

    #[test]
    fn test_sqlite_errors_become_storage_failures() {
        let err: TourError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, TourError::StorageFailure(_)));
    }
}
