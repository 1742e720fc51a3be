use std::f32::consts::PI;

use super::decider::{wrap_phase, DecisionMode};

/// Model points per decision interval returned by `get_model`.
pub const MODEL_POINTS_PER_INTERVAL: usize = 32;

/// Running signal quality model over decided samples.
///
/// Every value of a history window is attributed to its nearest decision
/// level. The residual power and level occupancy are smoothed exponentially
/// with factor `alpha`; the SNR is the half decision spacing over the noise
/// deviation, so 0 dB means noise spans half an interval.
///
/// Cheap to call, but callers gate `feed` on wall-clock time.
#[derive(Debug, Clone)]
pub struct QualityEstimator {
    mode: DecisionMode,
    minimum: f32,
    maximum: f32,
    bps: u32,
    sigma: f32,
    alpha: f32,
    occupancy: Vec<f32>,
}

impl QualityEstimator {
    pub fn new(mode: DecisionMode, minimum: f32, maximum: f32) -> Self {
        let mut estimator = Self {
            mode,
            minimum,
            maximum,
            bps: 1,
            sigma: 1.0,
            alpha: 0.5,
            occupancy: Vec::new(),
        };
        estimator.reset_occupancy();
        estimator
    }

    pub fn set_sigma(&mut self, sigma: f32) {
        self.sigma = sigma.max(f32::MIN_POSITIVE);
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(0.0, 1.0);
    }

    /// Resize the level layout. Occupancy restarts uniform.
    pub fn set_bps(&mut self, bps: u32) {
        if bps != self.bps {
            self.bps = bps;
            self.reset_occupancy();
        }
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn intervals(&self) -> usize {
        1usize << self.bps
    }

    /// Alpha proportional to the decision resolution, `1 / intervals`.
    pub fn default_alpha(&self) -> f32 {
        1.0 / self.intervals() as f32
    }

    fn interval_width(&self) -> f32 {
        (self.maximum - self.minimum) / self.intervals() as f32
    }

    fn level(&self, index: usize) -> f32 {
        self.minimum + (index as f32 + 0.5) * self.interval_width()
    }

    fn reset_occupancy(&mut self) {
        let n = self.intervals();
        self.occupancy = vec![1.0 / n as f32; n];
    }

    fn distance(&self, a: f32, b: f32) -> f32 {
        match self.mode {
            DecisionMode::Modulus => a - b,
            DecisionMode::Argument => wrap_phase(a - b),
        }
    }

    /// Ingest a window of decision-domain values (`|s|` or `arg s`).
    pub fn feed(&mut self, history: &[f32]) {
        let width = self.interval_width();
        if history.is_empty() || !(width > 0.0) {
            return;
        }

        let n = self.intervals();
        let mut counts = vec![0usize; n];
        let mut power = 0.0f64;
        let mut used = 0usize;

        for &value in history {
            if !value.is_finite() {
                continue;
            }
            let index = ((value - self.minimum) / width)
                .floor()
                .clamp(0.0, (n - 1) as f32) as usize;
            let residual = self.distance(value, self.level(index));
            power += (residual * residual) as f64;
            counts[index] += 1;
            used += 1;
        }

        if used == 0 {
            return;
        }

        let alpha = self.alpha;
        let variance = (1.0 - alpha) * self.sigma * self.sigma + alpha * (power / used as f64) as f32;
        self.sigma = variance.sqrt().max(f32::MIN_POSITIVE);

        for (occ, &count) in self.occupancy.iter_mut().zip(&counts) {
            *occ = (1.0 - alpha) * *occ + alpha * count as f32 / used as f32;
        }
    }

    /// Amplitude SNR: half decision spacing over noise deviation.
    pub fn get_snr(&self) -> f32 {
        0.5 * self.interval_width() / self.sigma
    }

    /// SNR in whole decibels, `floor(20·log10(snr))`.
    pub fn snr_db(&self) -> f32 {
        (20.0 * self.get_snr().log10()).floor()
    }

    /// Noise distribution sampled over `[minimum, maximum]`,
    /// `MODEL_POINTS_PER_INTERVAL` points per decision interval.
    pub fn get_model(&self) -> Vec<f32> {
        let n = self.intervals();
        let points = n * MODEL_POINTS_PER_INTERVAL;
        let step = (self.maximum - self.minimum) / points as f32;
        let sigma = self.sigma;
        let norm = 1.0 / (sigma * (2.0 * PI).sqrt());

        (0..points)
            .map(|i| {
                let x = self.minimum + (i as f32 + 0.5) * step;
                self.occupancy
                    .iter()
                    .enumerate()
                    .map(|(k, &occ)| {
                        let d = self.distance(x, self.level(k)) / sigma;
                        occ * norm * (-0.5 * d * d).exp()
                    })
                    .sum()
            })
            .collect()
    }
}
