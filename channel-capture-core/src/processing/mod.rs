pub mod decider;
pub mod estimator;
pub mod ring_buffer;
pub mod sample_format;
pub mod throttle;
