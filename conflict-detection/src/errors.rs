use hyper::StatusCode;
use options_store::StoreError;
use tokio::sync::AcquireError;

/// Errors that can occur while handling a conflict report
#[derive(thiserror::Error, Debug)]
pub enum ConflictDetectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("options store error: {0}")]
    Store(#[from] StoreError),

    #[error("stored option {key} is malformed: {reason}")]
    MalformedOption { key: &'static str, reason: String },

    #[error("update lock closed")]
    UpdateLock(#[from] AcquireError),

    #[error("failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("request body must be application/json")]
    UnsupportedMediaType,

    #[error("invalid conflict report: {0}")]
    InvalidReport(String),

    #[error("missing credentials")]
    Unauthorized,

    #[error("not allowed to report conflicts")]
    Forbidden,

    #[error("detection window of {0} minutes is out of range")]
    InvalidWindow(i64),
}

impl ConflictDetectionError {
    pub fn status(&self) -> StatusCode {
        match self {
            ConflictDetectionError::RequestBodyError(_)
            | ConflictDetectionError::InvalidReport(_)
            | ConflictDetectionError::InvalidWindow(_) => StatusCode::BAD_REQUEST,
            ConflictDetectionError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ConflictDetectionError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ConflictDetectionError::Unauthorized => StatusCode::UNAUTHORIZED,
            ConflictDetectionError::Forbidden => StatusCode::FORBIDDEN,
            ConflictDetectionError::Io(_)
            | ConflictDetectionError::Store(_)
            | ConflictDetectionError::MalformedOption { .. }
            | ConflictDetectionError::UpdateLock(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
