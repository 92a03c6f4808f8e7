pub mod endpoint;
pub mod record;

pub use endpoint::*;
pub use record::*;

/// Broad failure classes used for retry decisions, breaker accounting and
/// error routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transient,
    RateLimit,
    Authentication,
    ClientError,
    DataFormat,
    Configuration,
    Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Data format error: {0}")]
    DataFormat(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Offset store error: {0}")]
    OffsetStore(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Task error: {0}")]
    Task(String),
}

impl SourceError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        SourceError::Status {
            status,
            body: body.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            SourceError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    ErrorCategory::Transient
                } else if e.is_decode() {
                    ErrorCategory::DataFormat
                } else {
                    ErrorCategory::Unknown
                }
            }
            SourceError::Status { status, .. } => match *status {
                429 => ErrorCategory::RateLimit,
                401 | 403 => ErrorCategory::Authentication,
                408 => ErrorCategory::Transient,
                s if s >= 500 => ErrorCategory::Transient,
                s if s >= 400 => ErrorCategory::ClientError,
                _ => ErrorCategory::Unknown,
            },
            SourceError::Json(_) | SourceError::DataFormat(_) => ErrorCategory::DataFormat,
            SourceError::Configuration(_) => ErrorCategory::Configuration,
            SourceError::Authentication(_) => ErrorCategory::Authentication,
            SourceError::OffsetStore(_) | SourceError::Sink(_) | SourceError::Task(_) => {
                ErrorCategory::Unknown
            }
        }
    }

    /// Whether this failure counts toward the endpoint's circuit breaker.
    /// Unknown errors count only when they wrap transport I/O.
    pub fn counts_for_breaker(&self) -> bool {
        match self.category() {
            ErrorCategory::Transient | ErrorCategory::RateLimit => true,
            ErrorCategory::Unknown => matches!(self, SourceError::Http(_)),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
