use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use num_complex::Complex32;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::capture_summary::CaptureSummary;
use crate::models::config::CaptureSettings;
use crate::models::error::CaptureError;
use crate::models::events::{BackendKind, CaptureEvent, DriverEvent};
use crate::models::state::DriverState;
use crate::traits::data_writer::DataWriter;

/// Mutable driver state shared with the background thread.
struct DriverShared {
    state: DriverState,
    bytes_written: u64,
    samples_written: u64,
    last_error: Option<String>,
}

impl DriverShared {
    fn new() -> Self {
        Self {
            state: DriverState::Idle,
            bytes_written: 0,
            samples_written: 0,
            last_error: None,
        }
    }
}

/// Tags every event with the session it belongs to.
#[derive(Clone)]
struct EventSink {
    kind: BackendKind,
    session_id: Uuid,
    tx: Sender<DriverEvent>,
}

impl EventSink {
    fn emit(&self, event: CaptureEvent) {
        // A vanished owner has nothing left to notify.
        let _ = self.tx.send(DriverEvent {
            kind: self.kind,
            session_id: self.session_id,
            event,
        });
    }
}

/// Asynchronous capture session around one `DataWriter`.
///
/// The writer is moved onto a dedicated thread that drains a bounded queue
/// of sample batches. `write` never blocks: when the queue is full the
/// session is declared swamped and stops accepting data.
///
/// ```text
/// [feed thread] ─write()─→ [bounded queue] ─→ [capture thread] ─→ DataWriter
///                                                   │
///                         DriverEvent channel ←─────┘
/// ```
pub struct CaptureDriver {
    kind: BackendKind,
    session_id: Uuid,
    sample_rate: u32,
    shared: Arc<Mutex<DriverShared>>,
    halted: Arc<AtomicBool>,
    swamped: AtomicBool,
    batch_tx: Option<Sender<Vec<Complex32>>>,
    events: EventSink,
    worker: Option<thread::JoinHandle<()>>,
}

impl CaptureDriver {
    /// Arm a session. Configuration errors are returned here and no thread
    /// is started; backend failures are reported later as events.
    pub fn start<W>(
        writer: W,
        sample_rate: u32,
        settings: &CaptureSettings,
        events: Sender<DriverEvent>,
    ) -> Result<Self, CaptureError>
    where
        W: DataWriter + 'static,
    {
        if sample_rate == 0 {
            return Err(CaptureError::Configuration("sample rate must be non-zero".into()));
        }
        settings.validate().map_err(CaptureError::Configuration)?;

        let kind = writer.kind();
        let session_id = Uuid::new_v4();
        let shared = Arc::new(Mutex::new(DriverShared::new()));
        let halted = Arc::new(AtomicBool::new(false));
        let (batch_tx, batch_rx) = bounded(settings.queue_capacity);
        let events = EventSink {
            kind,
            session_id,
            tx: events,
        };

        let worker = Worker {
            writer,
            sample_rate,
            rx: batch_rx,
            shared: Arc::clone(&shared),
            halted: Arc::clone(&halted),
            events: events.clone(),
            report_interval: settings.report_interval(),
            rate_window: settings.rate_window(),
        };

        let thread_name = match kind {
            BackendKind::File => "capture-file",
            BackendKind::Network => "capture-network",
        };
        let handle = thread::Builder::new()
            .name(thread_name.into())
            .spawn(move || worker.run())?;

        log::info!(
            "armed {:?} capture session {} at {} samples/s",
            kind,
            session_id,
            sample_rate
        );

        Ok(Self {
            kind,
            session_id,
            sample_rate,
            shared,
            halted,
            swamped: AtomicBool::new(false),
            batch_tx: Some(batch_tx),
            events,
            worker: Some(handle),
        })
    }

    /// Queue a batch without blocking. Returns whether it was accepted.
    ///
    /// A full queue swamps the session: `Swamped` is emitted once and every
    /// later batch is refused.
    pub fn write(&self, samples: &[Complex32]) -> bool {
        if samples.is_empty() || self.halted.load(Ordering::Acquire) {
            return false;
        }
        let Some(tx) = self.batch_tx.as_ref() else {
            return false;
        };

        match tx.try_send(samples.to_vec()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                if !self.swamped.swap(true, Ordering::AcqRel) {
                    self.halted.store(true, Ordering::Release);
                    {
                        let mut s = self.shared.lock();
                        s.state = DriverState::Swamped;
                        s.last_error = Some(CaptureError::Swamped.to_string());
                    }
                    log::warn!("{:?} capture session {} swamped", self.kind, self.session_id);
                    self.events.emit(CaptureEvent::Swamped);
                }
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Disarm without waiting for the backend: no batch is written after
    /// this returns. Queued batches are discarded; the capture thread closes
    /// the writer and emits the final `Commit` and `Finished` on its own time.
    pub fn stop(&mut self) {
        self.halted.store(true, Ordering::Release);
        if self.batch_tx.take().is_some() {
            self.shared.lock().state = DriverState::Stopped;
            log::info!("disarmed {:?} capture session {}", self.kind, self.session_id);
        }
    }

    /// Whether the capture thread has closed the writer and exited.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |handle| handle.is_finished())
    }

    /// Block until the capture thread exits. Only meaningful after `stop`
    /// or a backend failure.
    pub fn join(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("capture thread of session {} panicked", self.session_id);
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Last known state. The capture thread may already be further along.
    pub fn state(&self) -> DriverState {
        self.shared.lock().state
    }

    pub fn bytes_written(&self) -> u64 {
        self.shared.lock().bytes_written
    }

    pub fn samples_written(&self) -> u64 {
        self.shared.lock().samples_written
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    pub fn is_swamped(&self) -> bool {
        self.swamped.load(Ordering::Acquire)
    }
}

impl Drop for CaptureDriver {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

/// Background half of a `CaptureDriver`; owns the writer exclusively.
struct Worker<W: DataWriter> {
    writer: W,
    sample_rate: u32,
    rx: Receiver<Vec<Complex32>>,
    shared: Arc<Mutex<DriverShared>>,
    halted: Arc<AtomicBool>,
    events: EventSink,
    report_interval: Duration,
    rate_window: Duration,
}

impl<W: DataWriter> Worker<W> {
    fn run(mut self) {
        let started = Instant::now();
        let mut summary = CaptureSummary::new(
            self.events.session_id,
            self.events.kind,
            &self.writer.describe(),
            self.sample_rate,
        );

        if !self.writer.prepare() {
            let error = self.writer.last_error();
            self.fail(&error);
            self.finish(summary, started, Some(error));
            return;
        }

        {
            let mut s = self.shared.lock();
            if s.state.is_idle() {
                s.state = DriverState::Armed;
            }
        }
        if self.writer.signals_ready() {
            self.events.emit(CaptureEvent::Ready);
        }

        let mut total_bytes = 0u64;
        let mut total_samples = 0u64;
        let mut last_commit = 0u64;
        let mut next_commit = Instant::now() + self.report_interval;
        let mut window_start = Instant::now();
        let mut window_bytes = 0u64;
        let mut error = None;

        loop {
            match self.rx.recv_timeout(self.report_interval) {
                Ok(batch) => {
                    if self.halted.load(Ordering::Acquire) {
                        break;
                    }
                    if !self.writer.can_write() {
                        let e = format!("backend not writable: {}", self.writer.last_error());
                        self.fail(&e);
                        error = Some(e);
                        break;
                    }

                    let written = self.writer.write(&batch);
                    if written <= 0 {
                        let e = self.writer.last_error();
                        self.fail(&e);
                        error = Some(e);
                        break;
                    }

                    total_bytes += written as u64;
                    total_samples += batch.len() as u64;
                    window_bytes += written as u64;

                    let mut s = self.shared.lock();
                    s.bytes_written = total_bytes;
                    s.samples_written = total_samples;
                    if s.state == DriverState::Armed {
                        s.state = DriverState::Streaming;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if self.halted.load(Ordering::Acquire) {
                break;
            }

            let now = Instant::now();
            if now >= next_commit {
                if total_bytes != last_commit {
                    self.events.emit(CaptureEvent::Commit(total_bytes));
                    last_commit = total_bytes;
                }
                next_commit = now + self.report_interval;
            }

            let elapsed = now.duration_since(window_start);
            if elapsed >= self.rate_window {
                let rate = window_bytes as f64 / elapsed.as_secs_f64();
                log::debug!("{:?} capture: {:.0} B/s, {} B total", self.events.kind, rate, total_bytes);
                self.events.emit(CaptureEvent::DataRate(rate));
                window_start = now;
                window_bytes = 0;
            }
        }

        summary.bytes_written = total_bytes;
        summary.samples_written = total_samples;
        self.finish(summary, started, error);
    }

    /// Backend failure: refuse further batches and tell the owner.
    fn fail(&self, error: &str) {
        self.halted.store(true, Ordering::Release);
        {
            let mut s = self.shared.lock();
            s.state = DriverState::Stopped;
            s.last_error = Some(error.to_string());
        }
        log::error!("{:?} capture session {} stopped: {}", self.events.kind, self.events.session_id, error);
        self.events.emit(CaptureEvent::Stopped(error.to_string()));
    }

    fn finish(mut self, mut summary: CaptureSummary, started: Instant, error: Option<String>) {
        if !self.writer.close() && error.is_none() {
            log::warn!("closing {} failed: {}", self.writer.describe(), self.writer.last_error());
        }

        summary.duration_secs = started.elapsed().as_secs_f64();
        summary.checksum = self.writer.checksum();
        summary.error = error.or_else(|| self.shared.lock().last_error.clone());

        self.events.emit(CaptureEvent::Commit(summary.bytes_written));
        self.events.emit(CaptureEvent::Finished(summary));
    }
}
