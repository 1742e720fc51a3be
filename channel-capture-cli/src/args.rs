//! Argument parsing for running from the command line

use std::path::PathBuf;

use channel_capture_core::{ChannelConfig, FieldValue, Transport};
use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Demodulator family of the synthetic channel
    #[arg(short, long, value_enum, default_value_t = Modulation::Ask)]
    pub modulation: Modulation,
    /// Symbol rate; also the capture sample rate
    #[arg(short, long, default_value_t = 9600.0)]
    pub baud: f64,
    /// Bits per symbol (0 disables demodulation)
    #[arg(long, default_value_t = 1)]
    #[arg(value_parser = clap::value_parser!(u32).range(0..=8))]
    pub bps: u32,
    /// Seconds of signal to generate
    #[arg(short, long, default_value_t = 2.0)]
    pub duration: f64,
    /// Samples per feed call
    #[arg(long, default_value_t = 1024)]
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    pub batch: u64,
    /// Standard deviation of the additive complex noise
    #[arg(long, default_value_t = 0.05)]
    pub noise: f32,
    /// Seed of the signal generator
    #[arg(long)]
    pub seed: Option<u64>,
    /// Record the stream to a capture file
    #[arg(short, long)]
    pub record: bool,
    /// Directory for capture files
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Forward the stream to HOST:PORT
    #[arg(short, long, value_parser = parse_endpoint)]
    pub forward: Option<(String, u16)>,
    /// Forwarding transport
    #[arg(long, value_enum, default_value_t = TransportArg::Tcp)]
    pub transport: TransportArg,
    /// Forwarding frame length in bytes
    #[arg(long, default_value_t = 1024)]
    pub frame_len: usize,
    /// Estimate SNR while feeding
    #[arg(long)]
    pub snr: bool,
    /// Export decided symbols on exit (.txt, .bin, .c, .h, .cpp)
    #[arg(short, long)]
    pub export: Option<PathBuf>,
    /// JSON file with capture settings
    #[arg(short, long)]
    pub settings: Option<PathBuf>,
    /// Feed as fast as possible instead of in real time
    #[arg(long)]
    pub burst: bool,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Modulation {
    /// Amplitude shift keying
    Ask,
    /// Phase keying through the carrier-recovery (AFC) inspector
    Afc,
    /// Frequency shift keying
    Fsk,
}

impl Modulation {
    pub fn prefix(&self) -> &'static str {
        match self {
            Modulation::Ask => "ask",
            Modulation::Afc => "afc",
            Modulation::Fsk => "fsk",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Tcp,
    Udp,
}

impl From<TransportArg> for Transport {
    fn from(t: TransportArg) -> Self {
        match t {
            TransportArg::Tcp => Transport::Tcp,
            TransportArg::Udp => Transport::Udp,
        }
    }
}

impl Args {
    /// Inspector configuration equivalent to the command line.
    pub fn channel_config(&self) -> ChannelConfig {
        let mut config = ChannelConfig::new();
        config
            .set("clock.baud", FieldValue::Float(self.baud))
            .set(
                format!("{}.bits-per-symbol", self.modulation.prefix()),
                FieldValue::Uint64(self.bps as u64),
            );
        config
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

fn parse_endpoint(s: &str) -> Result<(String, u16), String> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| "expected HOST:PORT".to_string())?;
    let port = port.parse::<u16>().map_err(|e| format!("invalid port: {}", e))?;
    if host.is_empty() {
        return Err("empty host".into());
    }
    Ok((host.trim_matches(|c| c == '[' || c == ']').to_string(), port))
}
