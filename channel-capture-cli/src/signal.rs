//! Synthetic baseband source standing in for the analyzer

use std::f32::consts::PI;

use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::args::Modulation;

/// Noisy one-sample-per-symbol baseband for a given modulation.
///
/// Amplitude keying puts symbol `k` at magnitude `(k + 0.5) / M` with a
/// random carrier phase; phase and frequency keying put it at phase
/// `-π + (k + 0.5)·2π/M` on the unit circle. Both match the decision
/// intervals of the corresponding demodulator.
pub struct SignalSource {
    modulation: Modulation,
    levels: u32,
    noise: f32,
    rng: StdRng,
}

impl SignalSource {
    pub fn new(modulation: Modulation, bps: u32, noise: f32, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            modulation,
            levels: 1 << bps.min(8),
            noise: noise.max(0.0),
            rng,
        }
    }

    /// Replace the contents of `out` with `len` fresh samples.
    pub fn fill(&mut self, out: &mut Vec<Complex32>, len: usize) {
        out.clear();
        out.reserve(len);
        for _ in 0..len {
            let symbol = self.rng.gen_range(0..self.levels);
            let sample = self.symbol_sample(symbol) + self.gaussian() * self.noise;
            out.push(sample);
        }
    }

    fn symbol_sample(&mut self, symbol: u32) -> Complex32 {
        let position = (symbol as f32 + 0.5) / self.levels as f32;
        match self.modulation {
            Modulation::Ask => {
                let carrier = self.rng.gen_range(-PI..PI);
                Complex32::from_polar(position, carrier)
            }
            Modulation::Afc | Modulation::Fsk => Complex32::from_polar(1.0, -PI + position * 2.0 * PI),
        }
    }

    /// Unit-variance circular complex Gaussian (Box-Muller).
    fn gaussian(&mut self) -> Complex32 {
        let u1: f32 = self.rng.gen_range(f32::EPSILON..1.0);
        let u2: f32 = self.rng.gen();
        let r = (-u1.ln()).sqrt();
        Complex32::from_polar(r, 2.0 * PI * u2)
    }
}
