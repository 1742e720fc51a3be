use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::BackendKind;

/// Final accounting of a capture session, emitted when its backend closes.
///
/// A failed session leaves whatever it committed in place; `bytes_written`
/// tells the operator how much of it is salvageable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSummary {
    pub session_id: String,
    pub kind: String,
    /// File path or `host:port`.
    pub target: String,
    pub sample_rate: u32,
    pub bytes_written: u64,
    pub samples_written: u64,
    pub started_at: String,
    pub duration_secs: f64,
    /// SHA-256 of the committed bytes, file captures only.
    pub checksum: Option<String>,
    pub error: Option<String>,
}

impl CaptureSummary {
    pub fn new(session_id: Uuid, kind: BackendKind, target: &str, sample_rate: u32) -> Self {
        Self {
            session_id: session_id.to_string(),
            kind: match kind {
                BackendKind::File => "file".into(),
                BackendKind::Network => "network".into(),
            },
            target: target.to_string(),
            sample_rate,
            bytes_written: 0,
            samples_written: 0,
            started_at: chrono::Utc::now().to_rfc3339(),
            duration_secs: 0.0,
            checksum: None,
            error: None,
        }
    }

    /// Whether this summary describes a file capture at `path`.
    pub fn is_file(&self, path: &Path) -> bool {
        self.kind == "file" && Path::new(&self.target) == path
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}
