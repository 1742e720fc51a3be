use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use num_complex::Complex32;

use crate::models::channel::{ChannelConfig, DemodulatorFamily};
use crate::models::config::{CaptureSettings, ForwarderConfig};
use crate::models::error::CaptureError;
use crate::models::events::{BackendKind, CaptureEvent, DriverEvent};
use crate::processing::decider::{DecisionMode, Decider};
use crate::processing::estimator::QualityEstimator;
use crate::processing::ring_buffer::RingBuffer;
use crate::processing::sample_format::normalize_phase_into;
use crate::processing::throttle::{ThrottleControl, ThrottleGate};
use crate::session::driver::CaptureDriver;
use crate::storage::file_writer::{open_capture_file, FileDataWriter};
use crate::storage::socket_forwarder::SocketForwarder;
use crate::storage::symbol_export::SymbolLog;
use crate::traits::data_writer::DataWriter;
use crate::traits::display_sink::{DisplaySink, SpectrumChange};

/// A display sink and its private view of the shared throttle.
struct GatedSink {
    sink: Box<dyn DisplaySink>,
    gate: ThrottleGate,
}

/// Single entry point of the sample feed.
///
/// Every batch is fanned out, in order, to:
/// 1. display sinks (data always, `refresh` gated by the shared throttle)
/// 2. the decider, when demodulating with a non-zero symbol width
/// 3. the quality estimator, at most once per estimator interval
/// 4. the active capture sessions, in the persisted representation of the
///    decision mode (raw IQ for modulus, `arg(s)/π` for argument)
///
/// Capture sessions never block `feed` and disarming never waits for a
/// backend. Stopped sessions finish on their own threads; their events are
/// collected with `process_events`, which also tears down sessions that
/// failed and reaps the ones that have exited.
pub struct FeedDispatcher {
    config: ChannelConfig,
    settings: CaptureSettings,
    family: Option<DemodulatorFamily>,

    decider: Decider,
    estimator: QualityEstimator,
    throttle: Arc<ThrottleControl>,
    sinks: Vec<GatedSink>,

    bps: u32,
    demodulating: bool,
    estimating: bool,
    last_estimator_update: Instant,
    snr_db: Option<f32>,
    snr_model: Vec<f32>,

    history: RingBuffer<f32>,
    history_scratch: Vec<f32>,
    decision_scratch: Vec<f32>,
    phase_scratch: Vec<Complex32>,
    symbol_log: SymbolLog,

    last_spectrum_rate: Option<u64>,
    last_spectrum_len: Option<usize>,

    recording_rate: u32,
    recorder: Option<CaptureDriver>,
    capture_path: Option<PathBuf>,
    forwarder: Option<CaptureDriver>,
    forwarder_config: Option<ForwarderConfig>,
    forwarder_ready: bool,
    retired: Vec<CaptureDriver>,

    event_tx: Sender<DriverEvent>,
    event_rx: Receiver<DriverEvent>,
}

impl FeedDispatcher {
    /// Build the pipeline for a channel. The decision mode and range are
    /// fixed by the channel's demodulator family for the dispatcher's
    /// lifetime; channels without a known family decide on `[0, 1]`
    /// magnitude but cannot be captured.
    pub fn new(config: ChannelConfig, settings: CaptureSettings) -> Result<Self, CaptureError> {
        settings.validate().map_err(CaptureError::Configuration)?;

        let family = config.family();
        let (mode, (minimum, maximum)) = match family {
            Some(f) => (f.decision_mode(), f.decision_range()),
            None => {
                log::warn!("channel has no known demodulator family, deciding on magnitude");
                (DecisionMode::Modulus, (0.0, 1.0))
            }
        };

        let bps = config.bits_per_symbol();
        let mut decider = Decider::new(mode, minimum, maximum);
        decider.set_bps(bps)?;
        let mut estimator = QualityEstimator::new(mode, minimum, maximum);
        estimator.set_bps(bps);

        let (event_tx, event_rx) = unbounded();

        Ok(Self {
            family,
            decider,
            estimator,
            throttle: ThrottleControl::new(settings.throttle_rate),
            sinks: Vec::new(),
            bps,
            demodulating: true,
            estimating: false,
            last_estimator_update: Instant::now(),
            snr_db: None,
            snr_model: Vec::new(),
            history: RingBuffer::new(settings.history_size),
            history_scratch: Vec::with_capacity(settings.history_size),
            decision_scratch: Vec::new(),
            phase_scratch: Vec::new(),
            symbol_log: SymbolLog::new(),
            last_spectrum_rate: None,
            last_spectrum_len: None,
            recording_rate: 0,
            recorder: None,
            capture_path: None,
            forwarder: None,
            forwarder_config: None,
            forwarder_ready: false,
            retired: Vec::new(),
            event_tx,
            event_rx,
            config,
            settings,
        })
    }

    /// Attach a display consumer. It receives the current symbol width
    /// immediately and shares the dispatcher's throttle.
    pub fn add_display_sink(&mut self, mut sink: Box<dyn DisplaySink>) {
        sink.set_bits_per_symbol(self.bps);
        let gate = self.throttle.gate();
        self.sinks.push(GatedSink { sink, gate });
    }

    /// Hot path. Completes in bounded time whatever the state of the
    /// capture backends.
    pub fn feed(&mut self, samples: &[Complex32]) {
        if samples.is_empty() {
            return;
        }

        self.decision_scratch.clear();
        self.decision_scratch
            .extend(samples.iter().map(|&s| self.decider.decision_value(s)));
        self.history.extend(&self.decision_scratch);

        for gated in &mut self.sinks {
            gated.sink.feed_samples(samples);
        }

        if self.demodulating && self.bps > 0 {
            self.decider.feed(samples);
            let symbols = self.decider.get();
            for gated in &mut self.sinks {
                gated.sink.feed_symbols(symbols);
            }
            self.symbol_log.append(symbols, self.bps);
        }

        if self.estimating {
            self.update_estimator();
        }

        self.refresh_sinks();

        if self.recorder.is_none() && self.forwarder.is_none() {
            return;
        }

        let data: &[Complex32] = match self.decider.decision_mode() {
            DecisionMode::Modulus => samples,
            DecisionMode::Argument => {
                normalize_phase_into(samples, &mut self.phase_scratch);
                &self.phase_scratch
            }
        };

        if let Some(recorder) = &self.recorder {
            recorder.write(data);
        }
        if let Some(forwarder) = &self.forwarder {
            forwarder.write(data);
        }
    }

    /// Spectrum pass-through. Sinks are told whether the rate or the bin
    /// count changed since the previous frame.
    pub fn feed_spectrum(&mut self, data: &[f32], rate: u64) {
        let change = SpectrumChange {
            rate_changed: self.last_spectrum_rate != Some(rate),
            len_changed: self.last_spectrum_len != Some(data.len()),
        };
        self.last_spectrum_rate = Some(rate);
        self.last_spectrum_len = Some(data.len());

        for gated in &mut self.sinks {
            gated.sink.feed_spectrum(data, rate, change);
        }
        self.refresh_sinks();
    }

    fn refresh_sinks(&mut self) {
        for gated in &mut self.sinks {
            if gated.gate.should_refresh() {
                gated.sink.refresh();
            }
        }
    }

    fn update_estimator(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_estimator_update) < self.settings.estimator_interval() {
            return;
        }
        self.last_estimator_update = now;

        self.history.snapshot_into(&mut self.history_scratch);
        self.estimator.feed(&self.history_scratch);

        let snr_db = self.estimator.snr_db();
        self.snr_db = Some(snr_db);
        self.snr_model = self.estimator.get_model();
        for gated in &mut self.sinks {
            gated.sink.set_snr_model(&self.snr_model, Some(snr_db));
        }
    }

    // -------------------------------------------------------------------
    // Decision and estimation control
    // -------------------------------------------------------------------

    /// Change the symbol width. Applied to the decider, the estimator and
    /// every sink before this returns, so the next batch is decided and
    /// displayed at the new width.
    pub fn set_bps(&mut self, bps: u32) -> Result<(), CaptureError> {
        if bps == self.bps {
            return Ok(());
        }

        self.decider.set_bps(bps)?;
        self.estimator.set_bps(bps);
        for gated in &mut self.sinks {
            gated.sink.set_bits_per_symbol(bps);
        }
        self.bps = bps;
        log::debug!("bits per symbol set to {}", bps);
        Ok(())
    }

    pub fn bps(&self) -> u32 {
        self.bps
    }

    pub fn set_demodulating(&mut self, demodulating: bool) {
        self.demodulating = demodulating;
    }

    pub fn is_demodulating(&self) -> bool {
        self.demodulating
    }

    /// Toggle SNR estimation. Enabling restarts the model from `sigma = 1`
    /// and `alpha = 1 / intervals`; disabling clears the sinks' overlay.
    pub fn set_estimating(&mut self, estimating: bool) {
        self.estimating = estimating;

        if estimating {
            self.estimator.set_sigma(1.0);
            self.estimator.set_alpha(1.0 / self.decider.intervals() as f32);
            self.last_estimator_update = Instant::now();
        } else {
            self.snr_db = None;
            self.snr_model.clear();
            for gated in &mut self.sinks {
                gated.sink.set_snr_model(&[], None);
            }
        }
    }

    pub fn is_estimating(&self) -> bool {
        self.estimating
    }

    /// Restart the noise estimate. Alpha and level occupancy are kept.
    pub fn reset_snr(&mut self) {
        self.estimator.set_sigma(1.0);
    }

    /// Last published SNR in whole dB, if estimating.
    pub fn snr_db(&self) -> Option<f32> {
        self.snr_db
    }

    pub fn snr_model(&self) -> &[f32] {
        &self.snr_model
    }

    /// Re-read baud rate and symbol width from a changed channel config.
    ///
    /// Active captures bound to the old baud rate are torn down and, if the
    /// new rate is non-zero, re-armed at the new rate. The decision history
    /// restarts.
    pub fn apply_config(&mut self, config: ChannelConfig) -> Result<(), CaptureError> {
        let new_rate = config.baud_rate();
        let old_rate = self.recording_rate;
        self.config = config;

        let mut result = Ok(());

        if self.recorder.is_some() && new_rate != old_rate {
            log::warn!("baud rate changed from {} to {}, restarting capture", old_rate, new_rate);
            self.disarm_recording();
            if new_rate != 0 {
                result = result.and(self.arm_recording().map(|_| ()));
            }
        }

        if self.forwarder.is_some() && new_rate != old_rate {
            log::warn!("baud rate changed from {} to {}, restarting forwarder", old_rate, new_rate);
            let endpoint = self.forwarder_config.clone();
            self.disarm_forwarding();
            if let Some(endpoint) = endpoint.filter(|_| new_rate != 0) {
                result = result.and(self.arm_forwarding(endpoint).map(|_| ()));
            }
        }

        self.set_bps(self.config.bits_per_symbol())?;
        self.history.reset();

        result
    }

    // -------------------------------------------------------------------
    // Capture sessions
    // -------------------------------------------------------------------

    /// Checks shared by both capture kinds. Returns the family and the
    /// sample rate the session is bound to.
    fn capture_parameters(&self) -> Result<(DemodulatorFamily, u32), CaptureError> {
        let family = self.family.ok_or_else(|| {
            CaptureError::InvalidDecisionMode("channel has no known demodulator family".into())
        })?;

        let baud = self.config.baud_rate();
        if baud == 0 {
            return Err(CaptureError::Configuration(
                "baud rate is zero, capture is disabled".into(),
            ));
        }

        Ok((family, baud))
    }

    /// Move a started session into the slot of its kind.
    fn start_session<W>(&mut self, writer: W, baud: u32) -> Result<(), CaptureError>
    where
        W: DataWriter + 'static,
    {
        let kind = writer.kind();
        let driver = CaptureDriver::start(writer, baud, &self.settings, self.event_tx.clone())?;
        self.recording_rate = baud;
        match kind {
            BackendKind::File => self.recorder = Some(driver),
            BackendKind::Network => {
                self.forwarder_ready = false;
                self.forwarder = Some(driver);
            }
        }
        Ok(())
    }

    /// Start recording to the next free capture file of the output
    /// directory. Returns `false` without side effects if already recording.
    pub fn arm_recording(&mut self) -> Result<bool, CaptureError> {
        if self.recorder.is_some() {
            return Ok(false);
        }

        let (family, baud) = self.capture_parameters()?;
        let (file, path) = open_capture_file(&self.settings.output_directory, family.class_name(), baud)?;
        self.start_session(FileDataWriter::new(file, path.clone()), baud)?;

        log::info!("recording {} channel to {}", family.class_name(), path.display());
        self.capture_path = Some(path);
        Ok(true)
    }

    /// Stop recording. No batch fed after this call reaches the file; the
    /// file is closed in the background. Returns whether a session was
    /// active.
    pub fn disarm_recording(&mut self) -> bool {
        match self.recorder.take() {
            Some(driver) => {
                self.retire(driver);
                true
            }
            None => false,
        }
    }

    /// Start forwarding to `endpoint`. Returns `false` without side effects
    /// if already forwarding. The session only counts as ready once its
    /// `Ready` event has been processed.
    pub fn arm_forwarding(&mut self, endpoint: ForwarderConfig) -> Result<bool, CaptureError> {
        if self.forwarder.is_some() {
            return Ok(false);
        }

        let (family, baud) = self.capture_parameters()?;
        endpoint.validate()?;

        let writer = SocketForwarder::new(endpoint.clone(), self.settings.write_timeout());
        self.start_session(writer, baud)?;

        log::info!(
            "forwarding {} channel to {} over {:?}",
            family.class_name(),
            endpoint.endpoint(),
            endpoint.transport
        );
        self.forwarder_config = Some(endpoint);
        Ok(true)
    }

    pub fn disarm_forwarding(&mut self) -> bool {
        self.forwarder_ready = false;
        match self.forwarder.take() {
            Some(driver) => {
                self.retire(driver);
                true
            }
            None => false,
        }
    }

    /// Arm a session around a caller-supplied backend, in the recording or
    /// forwarding slot according to its kind. Same rules as the built-in
    /// backends; a network writer armed this way is not re-armed when the
    /// baud rate changes.
    pub fn arm_writer<W>(&mut self, writer: W) -> Result<bool, CaptureError>
    where
        W: DataWriter + 'static,
    {
        let kind = writer.kind();
        if self.active_session(kind).is_some() {
            return Ok(false);
        }

        let (family, baud) = self.capture_parameters()?;
        let target = writer.describe();
        self.start_session(writer, baud)?;

        log::info!("capturing {} channel to {}", family.class_name(), target);
        if kind == BackendKind::Network {
            self.forwarder_config = None;
        }
        Ok(true)
    }

    /// Stop a session and keep it until its thread has exited.
    fn retire(&mut self, mut driver: CaptureDriver) {
        driver.stop();
        self.retired.push(driver);
    }

    /// Disarmed sessions whose thread is still closing its backend.
    pub fn retired_sessions(&self) -> usize {
        self.retired.len()
    }

    /// Disarm everything and collect events until every session has
    /// exited or `timeout` has passed. Sessions still busy after that stay
    /// retired; dropping the dispatcher waits for them.
    pub fn finish_sessions(&mut self, timeout: Duration) -> Vec<DriverEvent> {
        self.disarm_recording();
        self.disarm_forwarding();

        let deadline = Instant::now() + timeout;
        let mut events = self.process_events();
        while !self.retired.is_empty() {
            if Instant::now() >= deadline {
                log::warn!("{} capture session(s) still closing", self.retired.len());
                return events;
            }
            thread::sleep(Duration::from_millis(5));
            events.extend(self.process_events());
        }
        // Events sent between the last drain and the last reap.
        events.extend(self.process_events());
        events
    }

    fn active_session(&self, kind: BackendKind) -> Option<&CaptureDriver> {
        match kind {
            BackendKind::File => self.recorder.as_ref(),
            BackendKind::Network => self.forwarder.as_ref(),
        }
    }

    /// Drain pending session events.
    ///
    /// `Stopped` and `Swamped` disarm the session that raised them. Late
    /// status events of sessions that are no longer active are dropped;
    /// their final `Commit` and `Finished` are always returned. Never waits
    /// for a backend.
    pub fn process_events(&mut self) -> Vec<DriverEvent> {
        let mut events = Vec::new();

        while let Ok(event) = self.event_rx.try_recv() {
            let current = self
                .active_session(event.kind)
                .is_some_and(|d| d.session_id() == event.session_id);

            if !current {
                if matches!(event.event, CaptureEvent::Commit(_) | CaptureEvent::Finished(_)) {
                    events.push(event);
                } else {
                    log::debug!("dropping stale {:?} event of session {}", event.kind, event.session_id);
                }
                continue;
            }

            if event.is_fatal() {
                log::warn!("{:?} session {} failed, disarming", event.kind, event.session_id);
                match event.kind {
                    BackendKind::File => self.disarm_recording(),
                    BackendKind::Network => self.disarm_forwarding(),
                };
            } else if event.event == CaptureEvent::Ready {
                self.forwarder_ready = true;
            }
            events.push(event);
        }

        self.retired.retain(|driver| !driver.is_finished());
        events
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    pub fn is_forwarding(&self) -> bool {
        self.forwarder.is_some()
    }

    /// Forwarding and the connection handshake has completed.
    pub fn is_forwarding_ready(&self) -> bool {
        self.forwarder.is_some() && self.forwarder_ready
    }

    pub fn recorder(&self) -> Option<&CaptureDriver> {
        self.recorder.as_ref()
    }

    pub fn forwarder(&self) -> Option<&CaptureDriver> {
        self.forwarder.as_ref()
    }

    /// Path of the most recent capture file.
    pub fn capture_path(&self) -> Option<&Path> {
        self.capture_path.as_deref()
    }

    /// Baud rate the captures were last armed with.
    pub fn recording_rate(&self) -> u32 {
        self.recording_rate
    }

    // -------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn family(&self) -> Option<DemodulatorFamily> {
        self.family
    }

    /// Modulation class used in capture file names.
    pub fn class_name(&self) -> &'static str {
        self.family.map_or("UNKNOWN", |f| f.class_name())
    }

    pub fn decider(&self) -> &Decider {
        &self.decider
    }

    pub fn estimator(&self) -> &QualityEstimator {
        &self.estimator
    }

    /// Shared display throttle; rate and CPU burn apply to all sinks.
    pub fn throttle(&self) -> &Arc<ThrottleControl> {
        &self.throttle
    }

    pub fn symbol_log(&self) -> &SymbolLog {
        &self.symbol_log
    }

    pub fn clear_symbols(&mut self) {
        self.symbol_log.clear();
    }

    pub fn export_symbols(&self, path: &Path) -> Result<(), CaptureError> {
        self.symbol_log.export(path)?;
        log::info!("exported {} symbols to {}", self.symbol_log.len(), path.display());
        Ok(())
    }
}
