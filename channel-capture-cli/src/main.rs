mod args;
mod signal;

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use args::Args;
use channel_capture_core::{
    CaptureEvent, CaptureSettings, DisplaySink, DriverEvent, FeedDispatcher, ForwarderConfig, Symbol,
};
use clap::Parser;
use num_complex::Complex32;
use signal::SignalSource;

/// How long to wait at exit for capture sessions to flush and close.
const SESSION_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Console stand-in for the inspector views: logs a status line per
/// throttled frame.
#[derive(Default)]
struct StatusSink {
    samples: u64,
    symbols: u64,
    bps: u32,
    snr_db: Option<f32>,
}

impl DisplaySink for StatusSink {
    fn feed_samples(&mut self, samples: &[Complex32]) {
        self.samples += samples.len() as u64;
    }

    fn feed_symbols(&mut self, symbols: &[Symbol]) {
        self.symbols += symbols.len() as u64;
    }

    fn set_bits_per_symbol(&mut self, bps: u32) {
        self.bps = bps;
    }

    fn set_snr_model(&mut self, _model: &[f32], snr_db: Option<f32>) {
        self.snr_db = snr_db;
    }

    fn refresh(&mut self) {
        match self.snr_db {
            Some(snr) => log::debug!(
                "{} samples, {} symbols at {} bps, SNR {} dB",
                self.samples,
                self.symbols,
                self.bps,
                snr
            ),
            None => log::debug!("{} samples, {} symbols at {} bps", self.samples, self.symbols, self.bps),
        }
    }
}

fn load_settings(args: &Args) -> anyhow::Result<CaptureSettings> {
    let mut settings = match &args.settings {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings {}", path.display()))?;
            serde_json::from_str(&json).with_context(|| format!("invalid settings {}", path.display()))?
        }
        None => CaptureSettings::default(),
    };
    if let Some(dir) = &args.output {
        settings.output_directory = dir.clone();
    }
    Ok(settings)
}

fn report(events: Vec<DriverEvent>) -> anyhow::Result<()> {
    for event in events {
        match event.event {
            CaptureEvent::Ready => log::info!("{:?} session {} ready", event.kind, event.session_id),
            CaptureEvent::DataRate(rate) => log::info!("{:?}: {:.1} kB/s", event.kind, rate / 1e3),
            CaptureEvent::Commit(bytes) => log::debug!("{:?}: {} bytes committed", event.kind, bytes),
            CaptureEvent::Swamped => {
                log::error!("{:?} capture swamped, the sink is too slow for this rate", event.kind)
            }
            CaptureEvent::Stopped(error) => log::error!("{:?} capture interrupted: {}", event.kind, error),
            CaptureEvent::Finished(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.log_filter())
        .parse_default_env()
        .init();

    let settings = load_settings(&args)?;
    let mut dispatcher =
        FeedDispatcher::new(args.channel_config(), settings).context("failed to set up the feed")?;
    dispatcher.add_display_sink(Box::new(StatusSink::default()));
    dispatcher.set_estimating(args.snr);

    if args.record {
        dispatcher.arm_recording().context("failed to arm recording")?;
        if let Some(path) = dispatcher.capture_path() {
            log::info!("recording to {}", path.display());
        }
    }
    if let Some((host, port)) = &args.forward {
        dispatcher
            .arm_forwarding(ForwarderConfig {
                host: host.clone(),
                port: *port,
                frame_len: args.frame_len,
                transport: args.transport.into(),
            })
            .context("failed to arm forwarding")?;
    }

    let mut source = SignalSource::new(args.modulation, args.bps, args.noise, args.seed);
    let total = (args.duration * args.baud).max(0.0) as u64;
    let mut batch = Vec::with_capacity(args.batch as usize);
    let mut fed = 0u64;
    let start = Instant::now();

    while fed < total {
        let len = args.batch.min(total - fed);
        source.fill(&mut batch, len as usize);
        dispatcher.feed(&batch);
        fed += len;

        report(dispatcher.process_events())?;

        if !args.burst {
            let due = start + Duration::from_secs_f64(fed as f64 / args.baud);
            if let Some(wait) = due.checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            }
        }
    }

    report(dispatcher.finish_sessions(SESSION_CLOSE_TIMEOUT))?;

    if let Some(path) = &args.export {
        dispatcher
            .export_symbols(path)
            .with_context(|| format!("failed to export symbols to {}", path.display()))?;
    }

    let decider = dispatcher.decider();
    let stats = serde_json::json!({
        "samples": fed,
        "elapsed_secs": start.elapsed().as_secs_f64(),
        "symbols": dispatcher.symbol_log().len(),
        "symbol_bytes": dispatcher.symbol_log().size_bytes(),
        "clamped": decider.total_clamped(),
        "snr_db": dispatcher.snr_db(),
    });
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
