use num_complex::Complex32;

use crate::processing::decider::Symbol;

/// What changed since the previous spectrum frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpectrumChange {
    /// Sample rate differs; rescale the frequency axis.
    pub rate_changed: bool,
    /// Bin count differs; reset horizontal zoom.
    pub len_changed: bool,
}

/// A display-bound consumer of the feed (constellation, histogram, symbol
/// view, waterfall...).
///
/// `feed_*` calls happen for every batch so the view's model never misses
/// data. `refresh` is only invoked when the sink's throttle gate admits a
/// new frame. All methods run on the producer thread and must not block.
pub trait DisplaySink: Send {
    fn feed_samples(&mut self, _samples: &[Complex32]) {}

    fn feed_symbols(&mut self, _symbols: &[Symbol]) {}

    fn feed_spectrum(&mut self, _data: &[f32], _rate: u64, _change: SpectrumChange) {}

    /// Symbol width changed. Delivered before the next batch.
    fn set_bits_per_symbol(&mut self, _bps: u32) {}

    /// New noise model and SNR. An empty model with `None` clears the
    /// overlay when estimation is switched off.
    fn set_snr_model(&mut self, _model: &[f32], _snr_db: Option<f32>) {}

    /// Render accumulated state.
    fn refresh(&mut self);
}
