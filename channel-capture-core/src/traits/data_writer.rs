use num_complex::Complex32;

use crate::models::events::BackendKind;

/// Capability contract of a capture sink.
///
/// A writer is owned by exactly one capture driver and only ever called
/// from that driver's background thread, so methods may block.
///
/// Implemented by:
/// - `FileDataWriter` (local raw capture file)
/// - `SocketForwarder` (TCP/UDP forwarding)
pub trait DataWriter: Send {
    /// Which dispatcher slot this writer occupies.
    fn kind(&self) -> BackendKind;

    /// Blocking setup (open, connect). Called once before the first write.
    fn prepare(&mut self) -> bool;

    /// Cheap readiness check polled before each write.
    fn can_write(&self) -> bool;

    /// Write complex samples. Returns bytes written, `<= 0` on failure.
    fn write(&mut self, samples: &[Complex32]) -> isize;

    /// Write a pre-formatted payload. Returns bytes written, `<= 0` on failure.
    fn write_blob(&mut self, data: &[u8]) -> isize;

    /// Flush and release resources. Idempotent.
    fn close(&mut self) -> bool;

    /// Human-readable cause of the last failure.
    fn last_error(&self) -> String;

    /// Whether the driver announces `Ready` once `prepare` succeeds.
    fn signals_ready(&self) -> bool {
        false
    }

    /// Where the data goes (path or endpoint), for summaries and logs.
    fn describe(&self) -> String;

    /// Digest of everything written so far, if the writer keeps one.
    fn checksum(&self) -> Option<String> {
        None
    }
}
