use std::f32::consts::PI;

use num_complex::Complex32;

use crate::models::error::CaptureError;

/// Decided symbol. Wide enough for `MAX_BPS` bits.
pub type Symbol = u8;

/// Largest supported bits-per-symbol.
pub const MAX_BPS: u32 = 8;

/// Quantity a sample is decided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionMode {
    /// Magnitude `|s|` (amplitude demodulators).
    Modulus,
    /// Phase angle `arg(s)` in `(-π, π]` (phase/frequency demodulators).
    Argument,
}

/// Maps complex samples to symbols by quantizing the decided quantity into
/// `2^bps` uniform intervals over `[minimum, maximum]`.
///
/// Inputs outside the range are clamped into the edge intervals. The number
/// of clamped inputs is kept so the skew stays observable.
#[derive(Debug, Clone)]
pub struct Decider {
    mode: DecisionMode,
    minimum: f32,
    maximum: f32,
    bps: u32,
    symbols: Vec<Symbol>,
    last_clamped: usize,
    total_clamped: u64,
}

impl Decider {
    pub fn new(mode: DecisionMode, minimum: f32, maximum: f32) -> Self {
        Self {
            mode,
            minimum,
            maximum,
            bps: 1,
            symbols: Vec::new(),
            last_clamped: 0,
            total_clamped: 0,
        }
    }

    pub fn set_decision_mode(&mut self, mode: DecisionMode) {
        self.mode = mode;
    }

    pub fn set_minimum(&mut self, minimum: f32) {
        self.minimum = minimum;
    }

    pub fn set_maximum(&mut self, maximum: f32) {
        self.maximum = maximum;
    }

    /// Change the symbol width for subsequent batches. `0` disables decisions.
    pub fn set_bps(&mut self, bps: u32) -> Result<(), CaptureError> {
        if bps > MAX_BPS {
            return Err(CaptureError::Configuration(format!(
                "bits per symbol {} exceeds {}",
                bps, MAX_BPS
            )));
        }
        self.bps = bps;
        Ok(())
    }

    pub fn decision_mode(&self) -> DecisionMode {
        self.mode
    }

    pub fn minimum(&self) -> f32 {
        self.minimum
    }

    pub fn maximum(&self) -> f32 {
        self.maximum
    }

    pub fn bps(&self) -> u32 {
        self.bps
    }

    /// Number of decision intervals, `2^bps`.
    pub fn intervals(&self) -> u32 {
        1 << self.bps
    }

    /// Width of one decision interval.
    pub fn interval_width(&self) -> f32 {
        (self.maximum - self.minimum) / self.intervals() as f32
    }

    /// The quantity this decider quantizes for `sample`.
    pub fn decision_value(&self, sample: Complex32) -> f32 {
        match self.mode {
            DecisionMode::Modulus => sample.norm(),
            DecisionMode::Argument => wrap_phase(sample.arg()),
        }
    }

    /// Decide one batch. The symbols stay available through `get` until
    /// the next call.
    pub fn feed(&mut self, samples: &[Complex32]) {
        self.symbols.clear();
        self.symbols.reserve(samples.len());
        self.last_clamped = 0;

        for &sample in samples {
            let (symbol, clamped) = self.quantize(self.decision_value(sample));
            if clamped {
                self.last_clamped += 1;
            }
            self.symbols.push(symbol);
        }

        self.total_clamped += self.last_clamped as u64;
    }

    /// Symbols of the last batch.
    pub fn get(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Inputs of the last batch that fell outside `[minimum, maximum]`.
    pub fn last_clamped(&self) -> usize {
        self.last_clamped
    }

    pub fn total_clamped(&self) -> u64 {
        self.total_clamped
    }

    /// Quantize a decision-domain value. Returns the symbol and whether the
    /// value had to be clamped.
    pub fn quantize(&self, value: f32) -> (Symbol, bool) {
        let intervals = self.intervals();
        let width = self.interval_width();
        if !(width > 0.0) || !value.is_finite() {
            return (0, true);
        }

        let clamped = value < self.minimum || value > self.maximum;
        let index = ((value - self.minimum) / width).floor();
        let max_index = (intervals - 1) as f32;
        let symbol = index.clamp(0.0, max_index) as Symbol;

        (symbol, clamped)
    }

    /// Center of decision interval `symbol`.
    pub fn level(&self, symbol: Symbol) -> f32 {
        self.minimum + (symbol as f32 + 0.5) * self.interval_width()
    }
}

/// Wrap an angle into `(-π, π]`.
pub fn wrap_phase(angle: f32) -> f32 {
    let mut a = angle;
    while a > PI {
        a -= 2.0 * PI;
    }
    while a <= -PI {
        a += 2.0 * PI;
    }
    // Rounding of the shift above may land one ulp past π.
    a.min(PI)
}
