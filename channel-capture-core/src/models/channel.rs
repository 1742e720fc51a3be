use std::collections::BTreeMap;
use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::models::error::CaptureError;
use crate::processing::decider::DecisionMode;

/// A typed inspector configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Uint64(u64),
    Float(f64),
}

impl FieldValue {
    pub fn as_float(&self) -> f64 {
        match *self {
            Self::Uint64(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    pub fn as_uint64(&self) -> u64 {
        match *self {
            Self::Uint64(v) => v,
            Self::Float(v) if v > 0.0 => v as u64,
            Self::Float(_) => 0,
        }
    }
}

/// Inspector configuration as delivered by the analyzer: dotted keys such as
/// `clock.baud` or `fsk.bits-per-symbol` mapped to typed values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelConfig {
    fields: BTreeMap<String, FieldValue>,
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from its JSON object form.
    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        serde_json::from_str(json)
            .map_err(|e| CaptureError::Configuration(format!("invalid channel config: {}", e)))
    }

    pub fn set(&mut self, key: impl Into<String>, value: FieldValue) -> &mut Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<FieldValue> {
        self.fields.get(key).copied()
    }

    /// Whether any key lives under `<prefix>.`.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.fields.keys().any(|k| {
            k.strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    /// Symbol rate from `clock.baud`, 1 when absent.
    pub fn baud_rate(&self) -> u32 {
        self.get("clock.baud")
            .map(|v| v.as_float().max(0.0) as u32)
            .unwrap_or(1)
    }

    /// Bits per symbol of the active demodulator, never 0.
    pub fn bits_per_symbol(&self) -> u32 {
        let bps = ["afc", "fsk", "ask"]
            .iter()
            .find_map(|family| self.get(&format!("{}.bits-per-symbol", family)))
            .map(|v| v.as_uint64() as u32)
            .unwrap_or(0);

        if bps == 0 {
            1
        } else {
            bps
        }
    }

    pub fn family(&self) -> Option<DemodulatorFamily> {
        DemodulatorFamily::ALL
            .into_iter()
            .find(|f| self.has_prefix(f.prefix()))
    }
}

/// Demodulator family of the inspected channel, detected from config prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemodulatorFamily {
    Ask,
    Afc,
    Psk,
    Fsk,
}

impl DemodulatorFamily {
    pub const ALL: [DemodulatorFamily; 4] = [Self::Ask, Self::Afc, Self::Psk, Self::Fsk];

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::Afc => "afc",
            Self::Psk => "psk",
            Self::Fsk => "fsk",
        }
    }

    /// Modulation class used in capture file names.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Ask => "AM",
            Self::Afc | Self::Psk => "PM",
            Self::Fsk => "FM",
        }
    }

    pub fn decision_mode(&self) -> DecisionMode {
        match self {
            Self::Ask => DecisionMode::Modulus,
            Self::Afc | Self::Psk | Self::Fsk => DecisionMode::Argument,
        }
    }

    /// Decision interval `(minimum, maximum)`.
    pub fn decision_range(&self) -> (f32, f32) {
        match self.decision_mode() {
            DecisionMode::Modulus => (0.0, 1.0),
            DecisionMode::Argument => (-PI, PI),
        }
    }
}
