//! Raw capture sample format.
//!
//! Every persisted sample is a complex value stored as two little-endian
//! IEEE-754 `f32`:
//! ```text
//! [0-3]  in-phase (real)
//! [4-7]  quadrature (imaginary)
//! ```
//! Phase-mode captures store `arg(s)/π` in the real part and zero in the
//! imaginary part, so every capture has the same sample size.

use std::f32::consts::PI;

use num_complex::Complex32;

use super::decider::wrap_phase;

/// Bytes per persisted sample.
pub const SAMPLE_SIZE: usize = 8;

/// Append the wire form of `samples` to `out`.
pub fn encode_samples(samples: &[Complex32], out: &mut Vec<u8>) {
    out.reserve(samples.len() * SAMPLE_SIZE);
    for sample in samples {
        out.extend_from_slice(&sample.re.to_le_bytes());
        out.extend_from_slice(&sample.im.to_le_bytes());
    }
}

/// Parse raw capture bytes. A trailing partial sample is ignored.
pub fn decode_samples(bytes: &[u8]) -> Vec<Complex32> {
    bytes
        .chunks_exact(SAMPLE_SIZE)
        .map(|chunk| {
            let re = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let im = f32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            Complex32::new(re, im)
        })
        .collect()
}

/// Normalized phase `arg(s)/π`, in `[-1, 1]`.
pub fn normalized_phase(sample: Complex32) -> f32 {
    (wrap_phase(sample.arg()) / PI).clamp(-1.0, 1.0)
}

/// Fill `scratch` with the phase-mode persisted form of `samples`.
///
/// `scratch` is resized to the batch and reused across calls.
pub fn normalize_phase_into(samples: &[Complex32], scratch: &mut Vec<Complex32>) {
    scratch.clear();
    scratch.extend(
        samples
            .iter()
            .map(|&s| Complex32::new(normalized_phase(s), 0.0)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn encodes_little_endian_iq() {
        let mut out = Vec::new();
        encode_samples(&[Complex32::new(1.0, -2.0)], &mut out);

        assert_eq!(out.len(), SAMPLE_SIZE);
        assert_eq!(&out[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&out[4..8], &(-2.0f32).to_le_bytes());
    }

    #[test]
    fn decode_ignores_partial_tail() {
        let mut out = Vec::new();
        encode_samples(&[Complex32::new(0.5, 0.25), Complex32::new(-1.0, 3.0)], &mut out);
        out.extend_from_slice(&[0xAA, 0xBB, 0xCC]);

        let samples = decode_samples(&out);
        assert_eq!(samples, vec![Complex32::new(0.5, 0.25), Complex32::new(-1.0, 3.0)]);
    }

    #[test]
    fn normalized_phase_is_bounded_and_invertible() {
        for i in 0..720 {
            let theta = (i as f32 - 360.0) * PI / 360.0;
            let sample = Complex32::from_polar(0.3 + i as f32 * 0.01, theta);
            let scalar = normalized_phase(sample);

            assert!((-1.0..=1.0).contains(&scalar));
            assert_abs_diff_eq!(
                wrap_phase(scalar * PI),
                wrap_phase(sample.arg()),
                epsilon = 1e-4
            );
        }
    }

    #[test]
    fn scratch_is_resized_to_batch() {
        let mut scratch = vec![Complex32::new(9.0, 9.0); 16];
        normalize_phase_into(&[Complex32::new(0.0, 1.0), Complex32::new(-1.0, 0.0)], &mut scratch);

        assert_eq!(scratch.len(), 2);
        assert_abs_diff_eq!(scratch[0].re, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(scratch[1].re, 1.0, epsilon = 1e-6);
        assert_eq!(scratch[1].im, 0.0);
    }
}
