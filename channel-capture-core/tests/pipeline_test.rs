use std::f32::consts::PI;
use std::io::Read;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_abs_diff_eq;
use channel_capture_core::processing::sample_format::{decode_samples, SAMPLE_SIZE};
use channel_capture_core::{
    BackendKind, CaptureDriver, CaptureError, CaptureEvent, CaptureSettings, ChannelConfig, DataWriter,
    DisplaySink, DriverEvent, FeedDispatcher, FieldValue, ForwarderConfig, Symbol, Transport,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use num_complex::Complex32;
use parking_lot::Mutex;

fn channel(family: &str, baud: f64, bps: u64) -> ChannelConfig {
    let mut config = ChannelConfig::new();
    config
        .set("clock.baud", FieldValue::Float(baud))
        .set(format!("{}.bits-per-symbol", family), FieldValue::Uint64(bps));
    config
}

fn settings_in(dir: &std::path::Path) -> CaptureSettings {
    CaptureSettings {
        output_directory: dir.to_path_buf(),
        report_interval_ms: 20,
        rate_window_ms: 100,
        ..Default::default()
    }
}

fn ramp(len: usize) -> Vec<Complex32> {
    (0..len)
        .map(|i| Complex32::from_polar(0.1 + 0.8 * (i % 10) as f32 / 10.0, i as f32 * 0.37))
        .collect()
}

/// Pump events until `done` holds for one of them. Returns everything seen.
fn pump_until(
    dispatcher: &mut FeedDispatcher,
    mut done: impl FnMut(&DriverEvent) -> bool,
) -> Vec<DriverEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut seen = Vec::new();
    loop {
        for event in dispatcher.process_events() {
            let stop = done(&event);
            seen.push(event);
            if stop {
                return seen;
            }
        }
        assert!(Instant::now() < deadline, "timed out, got {:?}", seen);
        thread::sleep(Duration::from_millis(2));
    }
}

/// Wait until the active session of `kind` has written `bytes`.
fn wait_written(dispatcher: &FeedDispatcher, kind: BackendKind, bytes: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let session = match kind {
            BackendKind::File => dispatcher.recorder(),
            BackendKind::Network => dispatcher.forwarder(),
        };
        if session.map_or(0, |s| s.bytes_written()) >= bytes {
            return;
        }
        assert!(Instant::now() < deadline, "session never wrote {} bytes", bytes);
        thread::sleep(Duration::from_millis(1));
    }
}

fn is_finished(event: &DriverEvent) -> bool {
    matches!(event.event, CaptureEvent::Finished(_))
}

#[test]
fn one_second_at_9600_baud_commits_every_sample() {
    let dir = tempfile::tempdir().unwrap();
    let mut dispatcher = FeedDispatcher::new(channel("ask", 9600.0, 1), settings_in(dir.path())).unwrap();
    assert!(dispatcher.arm_recording().unwrap());
    let path = dispatcher.capture_path().unwrap().to_path_buf();

    let batch = ramp(960);
    for _ in 0..10 {
        dispatcher.feed(&batch);
        thread::sleep(Duration::from_millis(100));
    }
    wait_written(&dispatcher, BackendKind::File, 9600 * SAMPLE_SIZE as u64);
    dispatcher.disarm_recording();

    let events = pump_until(&mut dispatcher, is_finished);
    let commits: Vec<u64> = events
        .iter()
        .filter_map(|e| match e.event {
            CaptureEvent::Commit(n) => Some(n),
            _ => None,
        })
        .collect();
    assert!(commits.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(commits.last(), Some(&(9600 * SAMPLE_SIZE as u64)));

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 9600 * SAMPLE_SIZE);
    let decoded = decode_samples(&bytes);
    assert_eq!(&decoded[..960], &batch[..]);

    match &events.last().unwrap().event {
        CaptureEvent::Finished(summary) => {
            assert!(summary.is_file(&path));
            assert_eq!(summary.samples_written, 9600);
            assert_eq!(summary.sample_rate, 9600);
            assert!(summary.is_clean());
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn rearming_starts_a_fresh_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut dispatcher = FeedDispatcher::new(channel("ask", 1200.0, 1), settings_in(dir.path())).unwrap();

    dispatcher.arm_recording().unwrap();
    let first = dispatcher.recorder().unwrap().session_id();
    dispatcher.feed(&ramp(100));

    // Arming again while armed must not disturb the running session.
    assert!(!dispatcher.arm_recording().unwrap());
    wait_written(&dispatcher, BackendKind::File, 800);
    assert_eq!(dispatcher.recorder().unwrap().session_id(), first);

    dispatcher.disarm_recording();
    assert!(dispatcher.arm_recording().unwrap());

    let second = dispatcher.recorder().unwrap();
    assert_ne!(second.session_id(), first);
    assert_eq!(second.bytes_written(), 0);
    assert_eq!(
        dispatcher.capture_path().unwrap().file_name().unwrap(),
        "channel-capture-AM-1200-baud-0002.raw"
    );
}

#[test]
fn phase_captures_store_normalized_angle() {
    let dir = tempfile::tempdir().unwrap();
    let mut dispatcher = FeedDispatcher::new(channel("fsk", 2400.0, 1), settings_in(dir.path())).unwrap();
    dispatcher.arm_recording().unwrap();
    let path = dispatcher.capture_path().unwrap().to_path_buf();
    assert!(path.to_string_lossy().contains("channel-capture-FM-2400-baud-0001"));

    let batch = ramp(500);
    dispatcher.feed(&batch);
    wait_written(&dispatcher, BackendKind::File, 500 * SAMPLE_SIZE as u64);
    dispatcher.disarm_recording();
    pump_until(&mut dispatcher, is_finished);

    let stored = decode_samples(&std::fs::read(&path).unwrap());
    assert_eq!(stored.len(), batch.len());
    for (value, original) in stored.iter().zip(&batch) {
        assert!((-1.0..=1.0).contains(&value.re));
        assert_eq!(value.im, 0.0);
        let angle = value.re * PI;
        assert_abs_diff_eq!(angle.cos(), original.arg().cos(), epsilon = 1e-4);
        assert_abs_diff_eq!(angle.sin(), original.arg().sin(), epsilon = 1e-4);
    }
}

#[test]
fn forwarder_reports_ready_and_streams_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let reader = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        bytes
    });

    let settings = CaptureSettings {
        report_interval_ms: 20,
        ..Default::default()
    };
    let mut dispatcher = FeedDispatcher::new(channel("psk", 1000.0, 2), settings).unwrap();
    let endpoint = ForwarderConfig {
        host: "127.0.0.1".into(),
        port,
        frame_len: 64,
        transport: Transport::Tcp,
    };
    assert!(dispatcher.arm_forwarding(endpoint.clone()).unwrap());
    assert!(!dispatcher.arm_forwarding(endpoint).unwrap());
    assert!(!dispatcher.is_forwarding_ready());

    pump_until(&mut dispatcher, |e| e.event == CaptureEvent::Ready);
    assert!(dispatcher.is_forwarding_ready());

    dispatcher.feed(&ramp(101));
    wait_written(&dispatcher, BackendKind::Network, 101 * SAMPLE_SIZE as u64);
    dispatcher.disarm_forwarding();
    assert!(!dispatcher.is_forwarding_ready());

    let events = pump_until(&mut dispatcher, is_finished);
    assert!(events.iter().all(|e| e.kind == BackendKind::Network));

    let received = decode_samples(&reader.join().unwrap());
    assert_eq!(received.len(), 101);
    assert!(received.iter().all(|s| (-1.0..=1.0).contains(&s.re)));
}

#[test]
fn refused_forwarder_is_disarmed_by_the_event_pump() {
    // Grab a free port, then close it so the connection is refused.
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();

    let mut dispatcher = FeedDispatcher::new(channel("ask", 1000.0, 1), CaptureSettings::default()).unwrap();
    dispatcher
        .arm_forwarding(ForwarderConfig {
            host: "127.0.0.1".into(),
            port,
            frame_len: 64,
            transport: Transport::Tcp,
        })
        .unwrap();

    let events = pump_until(&mut dispatcher, |e| matches!(e.event, CaptureEvent::Stopped(_)));
    assert!(!dispatcher.is_forwarding());
    assert!(!events.iter().any(|e| e.event == CaptureEvent::Ready));

    // The session is not retried; the owner has to arm again.
    dispatcher.feed(&ramp(10));
    assert!(!dispatcher.is_forwarding());
}

#[test]
fn invalid_forwarder_endpoint_is_rejected_synchronously() {
    let mut dispatcher = FeedDispatcher::new(channel("ask", 1000.0, 1), CaptureSettings::default()).unwrap();
    let result = dispatcher.arm_forwarding(ForwarderConfig {
        host: "127.0.0.1".into(),
        port: 9,
        frame_len: 0,
        transport: Transport::Udp,
    });
    assert!(matches!(result, Err(CaptureError::Configuration(_))));
    assert!(!dispatcher.is_forwarding());
}

#[derive(Clone, Default)]
struct SymbolBatches(Arc<Mutex<Vec<Vec<Symbol>>>>);

impl DisplaySink for SymbolBatches {
    fn feed_symbols(&mut self, symbols: &[Symbol]) {
        self.0.lock().push(symbols.to_vec());
    }

    fn refresh(&mut self) {}
}

#[test]
fn symbols_after_bps_change_use_new_width_and_size() {
    let mut dispatcher = FeedDispatcher::new(channel("ask", 1.0, 1), CaptureSettings::default()).unwrap();
    let batches = SymbolBatches::default();
    dispatcher.add_display_sink(Box::new(batches.clone()));

    let levels: Vec<Complex32> = (0..8).map(|k| Complex32::new((k as f32 + 0.5) / 8.0, 0.0)).collect();
    dispatcher.feed(&levels);
    dispatcher.set_bps(3).unwrap();
    dispatcher.feed(&levels);

    let batches = batches.0.lock();
    assert_eq!(batches[0], vec![0, 0, 0, 0, 1, 1, 1, 1]);
    assert_eq!(batches[1], (0..8).collect::<Vec<Symbol>>());
    assert_eq!(dispatcher.symbol_log().size_bits(), 8 + 8 * 3);
    assert_eq!(dispatcher.symbol_log().size_bytes(), 4);
}

/// Writer that blocks inside `write` until released.
struct StallingWriter {
    written: Arc<Mutex<Vec<f32>>>,
    entered: Sender<()>,
    release: Receiver<()>,
    closed: Arc<AtomicBool>,
}

impl DataWriter for StallingWriter {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn prepare(&mut self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        true
    }

    fn write(&mut self, samples: &[Complex32]) -> isize {
        let _ = self.entered.send(());
        let _ = self.release.recv();
        self.written.lock().push(samples[0].re);
        (samples.len() * SAMPLE_SIZE) as isize
    }

    fn write_blob(&mut self, data: &[u8]) -> isize {
        data.len() as isize
    }

    fn close(&mut self) -> bool {
        self.closed.store(true, Ordering::SeqCst);
        true
    }

    fn last_error(&self) -> String {
        String::new()
    }

    fn describe(&self) -> String {
        "stalling sink".into()
    }
}

#[test]
fn slow_sink_swamps_once_without_duplicate_writes() {
    let (event_tx, event_rx) = unbounded();
    let (entered_tx, entered_rx) = unbounded();
    let (release_tx, release_rx) = unbounded();
    let written = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));

    let writer = StallingWriter {
        written: Arc::clone(&written),
        entered: entered_tx,
        release: release_rx,
        closed: Arc::clone(&closed),
    };
    let settings = CaptureSettings {
        queue_capacity: 3,
        ..Default::default()
    };
    let mut driver = CaptureDriver::start(writer, 9600, &settings, event_tx).unwrap();

    let batch = |marker: f32| vec![Complex32::new(marker, 0.0); 32];
    assert!(driver.write(&batch(0.0)));
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let started = Instant::now();
    let accepted = (1..50).filter(|&i| driver.write(&batch(i as f32))).count();
    // The producer is never held up by the stalled sink.
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(accepted, 3);

    for _ in 0..50 {
        let _ = release_tx.send(());
    }
    driver.stop();
    driver.join();
    assert!(closed.load(Ordering::SeqCst));

    let events: Vec<CaptureEvent> = event_rx.try_iter().map(|e| e.event).collect();
    assert_eq!(events.iter().filter(|e| **e == CaptureEvent::Swamped).count(), 1);
    assert_eq!(*written.lock(), vec![0.0]);
    assert!(matches!(events.last(), Some(CaptureEvent::Finished(s)) if !s.is_clean()));
}

#[test]
fn swamped_session_is_disarmed_without_stalling_the_feed() {
    let (entered_tx, entered_rx) = unbounded();
    let (release_tx, release_rx) = unbounded();
    let written = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    let writer = StallingWriter {
        written: Arc::clone(&written),
        entered: entered_tx,
        release: release_rx,
        closed: Arc::clone(&closed),
    };

    let settings = CaptureSettings {
        queue_capacity: 2,
        ..Default::default()
    };
    let mut dispatcher = FeedDispatcher::new(channel("ask", 9600.0, 1), settings).unwrap();
    assert!(dispatcher.arm_writer(writer).unwrap());

    let batch = |marker: f32| vec![Complex32::new(marker, 0.0); 32];
    dispatcher.feed(&batch(0.5));
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    for i in 1..6 {
        dispatcher.feed(&batch(0.1 * i as f32));
    }
    assert!(dispatcher.recorder().unwrap().is_swamped());

    // The sink is still stuck in its first write.
    let started = Instant::now();
    let events = dispatcher.process_events();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(events.iter().filter(|e| e.event == CaptureEvent::Swamped).count(), 1);
    assert!(!dispatcher.is_recording());
    assert_eq!(dispatcher.retired_sessions(), 1);
    assert!(!closed.load(Ordering::SeqCst));

    let decided = dispatcher.symbol_log().len();
    dispatcher.feed(&batch(0.9));
    assert_eq!(dispatcher.symbol_log().len(), decided + 32);

    for _ in 0..10 {
        let _ = release_tx.send(());
    }
    let events = dispatcher.finish_sessions(Duration::from_secs(5));
    assert_eq!(dispatcher.retired_sessions(), 0);
    assert!(closed.load(Ordering::SeqCst));
    assert_eq!(*written.lock(), vec![0.5]);
    assert!(!events.iter().any(|e| e.event == CaptureEvent::Swamped));
    match events.iter().find(|e| is_finished(e)).map(|e| &e.event) {
        Some(CaptureEvent::Finished(summary)) => {
            assert_eq!(summary.error.as_deref(), Some("capture queue swamped"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn forwarder_dropped_by_peer_mid_stream_stops_without_retry() {
    const PEER_READS: usize = 512 * SAMPLE_SIZE;

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut head = vec![0u8; PEER_READS];
        stream.read_exact(&mut head).unwrap();
        // Hang up with data still unread.
        head
    });

    let settings = CaptureSettings {
        report_interval_ms: 20,
        queue_capacity: 1024,
        ..Default::default()
    };
    let mut dispatcher = FeedDispatcher::new(channel("ask", 1000.0, 1), settings).unwrap();
    dispatcher
        .arm_forwarding(ForwarderConfig {
            host: "127.0.0.1".into(),
            port,
            frame_len: 64,
            transport: Transport::Tcp,
        })
        .unwrap();
    pump_until(&mut dispatcher, |e| e.event == CaptureEvent::Ready);

    let mut fed = Vec::new();
    let mut events = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    while !events.iter().any(|e: &DriverEvent| matches!(e.event, CaptureEvent::Stopped(_))) {
        assert!(Instant::now() < deadline, "forwarder never stopped, got {:?}", events);
        let batch = ramp(256);
        dispatcher.feed(&batch);
        fed.extend(batch);
        events.extend(dispatcher.process_events());
        thread::sleep(Duration::from_millis(2));
    }

    assert!(!dispatcher.is_forwarding());
    assert!(!events.iter().any(|e| e.event == CaptureEvent::Swamped));

    // No reconnection: later batches go nowhere and no new session appears.
    dispatcher.feed(&ramp(256));
    events.extend(pump_until(&mut dispatcher, is_finished));
    assert!(!dispatcher.is_forwarding());
    assert_eq!(events.iter().filter(|e| e.event == CaptureEvent::Ready).count(), 0);
    match &events.last().unwrap().event {
        CaptureEvent::Finished(summary) => {
            assert!(!summary.is_clean());
            assert!(summary.error.as_deref().is_some_and(|e| e.contains("send() failed")));
        }
        other => panic!("unexpected {:?}", other),
    }

    // What the peer saw is exactly the start of the feed.
    let head = decode_samples(&peer.join().unwrap());
    assert_eq!(&head[..], &fed[..head.len()]);
}
