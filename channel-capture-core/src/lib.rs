//! # channel-capture-core
//!
//! Real-time sample distribution and capture pipeline for a channel
//! inspector.
//!
//! Complex baseband samples enter through the `FeedDispatcher`, which
//! decides symbols, estimates signal quality, feeds rate-limited display
//! sinks and hands the stream to asynchronous capture sessions (raw file,
//! TCP/UDP forwarder) that never block the feed.
//!
//! ## Architecture
//!
//! ```text
//! channel-capture-core (this crate)
//! ├── traits/       ← DataWriter, DisplaySink
//! ├── models/       ← CaptureError, DriverState, ChannelConfig, CaptureSettings, events
//! ├── processing/   ← Decider, QualityEstimator, ThrottleControl, RingBuffer, sample format
//! ├── session/      ← CaptureDriver (per-backend thread), FeedDispatcher
//! └── storage/      ← FileDataWriter, SocketForwarder, SymbolLog export
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::capture_summary::CaptureSummary;
pub use models::channel::{ChannelConfig, DemodulatorFamily, FieldValue};
pub use models::config::{CaptureSettings, ForwarderConfig, Transport};
pub use models::error::CaptureError;
pub use models::events::{BackendKind, CaptureEvent, DriverEvent};
pub use models::state::DriverState;
pub use processing::decider::{DecisionMode, Decider, Symbol, MAX_BPS};
pub use processing::estimator::QualityEstimator;
pub use processing::ring_buffer::RingBuffer;
pub use processing::throttle::{ThrottleControl, ThrottleGate};
pub use session::dispatcher::FeedDispatcher;
pub use session::driver::CaptureDriver;
pub use storage::file_writer::FileDataWriter;
pub use storage::socket_forwarder::SocketForwarder;
pub use storage::symbol_export::{SymbolFileFormat, SymbolLog};
pub use traits::data_writer::DataWriter;
pub use traits::display_sink::{DisplaySink, SpectrumChange};
