use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::error::CaptureError;

/// Tuning for the dispatcher and the capture drivers it spawns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Directory where capture files are created (default: current dir).
    pub output_directory: PathBuf,

    /// Pending batches a driver may hold before it reports `Swamped`.
    pub queue_capacity: usize,

    /// Period of `Commit` reports while streaming.
    pub report_interval_ms: u64,

    /// Window over which `DataRate` is averaged.
    pub rate_window_ms: u64,

    /// Decided samples kept for the quality estimator.
    pub history_size: usize,

    /// Display refresh rate in frames per second.
    pub throttle_rate: u32,

    /// Minimum wall-clock time between estimator updates.
    pub estimator_interval_ms: u64,

    /// Socket write timeout for the network forwarder.
    pub write_timeout_ms: u64,
}

impl CaptureSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("queue capacity must be positive".into());
        }
        if self.report_interval_ms == 0 || self.rate_window_ms == 0 {
            return Err("report intervals must be positive".into());
        }
        if self.history_size == 0 {
            return Err("history size must be positive".into());
        }
        if self.throttle_rate == 0 {
            return Err("throttle rate must be positive".into());
        }
        Ok(())
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    pub fn estimator_interval(&self) -> Duration {
        Duration::from_millis(self.estimator_interval_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            queue_capacity: 32,
            report_interval_ms: 250,
            rate_window_ms: 1000,
            history_size: 4096,
            throttle_rate: 30,
            estimator_interval_ms: 100,
            write_timeout_ms: 2000,
        }
    }
}

/// Transport used by the network forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
}

/// Remote endpoint for sample forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwarderConfig {
    pub host: String,
    pub port: u16,
    /// Bytes per frame put on the wire.
    pub frame_len: usize,
    pub transport: Transport,
}

impl ForwarderConfig {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.host.trim().is_empty() {
            return Err(CaptureError::Configuration("forwarder host is empty".into()));
        }
        if self.port == 0 {
            return Err(CaptureError::Configuration("forwarder port must be non-zero".into()));
        }
        if self.frame_len == 0 {
            return Err(CaptureError::Configuration("frame length must be positive".into()));
        }
        // A UDP datagram cannot carry more than this payload.
        if self.transport == Transport::Udp && self.frame_len > 65_507 {
            return Err(CaptureError::Configuration(format!(
                "frame length {} exceeds the UDP payload limit",
                self.frame_len
            )));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(CaptureSettings::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_capacity() {
        let settings = CaptureSettings {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let settings: CaptureSettings =
            serde_json::from_str(r#"{ "queue_capacity": 4, "throttle_rate": 60 }"#).unwrap();
        assert_eq!(settings.queue_capacity, 4);
        assert_eq!(settings.throttle_rate, 60);
        assert_eq!(settings.history_size, 4096);
    }

    #[test]
    fn forwarder_validation() {
        let mut config = ForwarderConfig {
            host: "localhost".into(),
            port: 5555,
            frame_len: 1024,
            transport: Transport::Udp,
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoint(), "localhost:5555");

        config.frame_len = 70_000;
        assert!(config.validate().is_err());

        config.transport = Transport::Tcp;
        assert!(config.validate().is_ok());

        config.port = 0;
        assert!(config.validate().is_err());
    }
}
