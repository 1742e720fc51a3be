use serde::Serialize;
use uuid::Uuid;

use super::capture_summary::CaptureSummary;

/// Kind of writer backend behind a capture session.
///
/// The dispatcher holds at most one session per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Network,
}

/// Notification emitted by a capture driver's background thread.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// The backend finished its connection handshake (forwarder only).
    Ready,
    /// Average throughput over the last rate window, in bytes per second.
    DataRate(f64),
    /// Cumulative bytes committed to the backend.
    Commit(u64),
    /// The pending-batch queue overflowed; the session is dead.
    Swamped,
    /// The backend failed; carries its last error text.
    Stopped(String),
    /// The backend was closed. Always the last event of a session.
    Finished(CaptureSummary),
}

/// A `CaptureEvent` tagged with the session it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverEvent {
    pub kind: BackendKind,
    pub session_id: Uuid,
    pub event: CaptureEvent,
}

impl DriverEvent {
    /// Whether the owner must tear the session down.
    pub fn is_fatal(&self) -> bool {
        matches!(self.event, CaptureEvent::Swamped | CaptureEvent::Stopped(_))
    }
}
