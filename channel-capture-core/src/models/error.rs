use thiserror::Error;

/// Errors surfaced by the capture pipeline.
///
/// Configuration and format errors are returned synchronously before any
/// session exists. I/O failures of a running session are reported through
/// `CaptureEvent::Stopped` instead, so the producer path never sees them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("configuration failed: {0}")]
    Configuration(String),

    #[error("invalid decision mode: {0}")]
    InvalidDecisionMode(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("capture queue swamped")]
    Swamped,

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
