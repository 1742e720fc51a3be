use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Default display refresh rate in frames per second.
pub const THROTTLE_DEFAULT_RATE: u32 = 30;

/// Refresh-rate policy shared by every display consumer.
///
/// Time is cut into frames of `1 / rate` seconds counted from a common
/// epoch; a consumer may render once per frame. Because every gate counts
/// frames from the same epoch, all views refresh on the same boundaries.
/// With CPU burn enabled every batch renders.
#[derive(Debug)]
pub struct ThrottleControl {
    epoch: Instant,
    rate: AtomicU32,
    cpu_burn: AtomicBool,
}

impl ThrottleControl {
    pub fn new(rate: u32) -> Arc<Self> {
        Arc::new(Self {
            epoch: Instant::now(),
            rate: AtomicU32::new(rate.max(1)),
            cpu_burn: AtomicBool::new(false),
        })
    }

    pub fn set_rate(&self, fps: u32) {
        self.rate.store(fps.max(1), Ordering::Relaxed);
    }

    pub fn rate(&self) -> u32 {
        self.rate.load(Ordering::Relaxed)
    }

    pub fn set_cpu_burn(&self, burn: bool) {
        self.cpu_burn.store(burn, Ordering::Relaxed);
    }

    pub fn cpu_burn(&self) -> bool {
        self.cpu_burn.load(Ordering::Relaxed)
    }

    /// Index of the frame containing `now`.
    pub fn frame_at(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.epoch);
        (elapsed.as_secs_f64() * self.rate() as f64) as u64
    }

    /// A per-consumer gate bound to this throttle.
    pub fn gate(self: &Arc<Self>) -> ThrottleGate {
        ThrottleGate {
            control: Arc::clone(self),
            last_frame: None,
        }
    }
}

/// One consumer's view of a shared `ThrottleControl`.
#[derive(Debug, Clone)]
pub struct ThrottleGate {
    control: Arc<ThrottleControl>,
    last_frame: Option<u64>,
}

impl ThrottleGate {
    /// Whether the consumer may render now. Accepting marks the frame used.
    pub fn should_refresh(&mut self) -> bool {
        self.should_refresh_at(Instant::now())
    }

    pub fn should_refresh_at(&mut self, now: Instant) -> bool {
        if self.control.cpu_burn() {
            return true;
        }

        let frame = self.control.frame_at(now);
        match self.last_frame {
            Some(last) if frame <= last => false,
            _ => {
                self.last_frame = Some(frame);
                true
            }
        }
    }

    pub fn control(&self) -> &Arc<ThrottleControl> {
        &self.control
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn one_refresh_per_frame() {
        let control = ThrottleControl::new(10);
        let mut gate = control.gate();
        let t0 = control.epoch + Duration::from_millis(5);

        assert!(gate.should_refresh_at(t0));
        assert!(!gate.should_refresh_at(t0 + Duration::from_millis(50)));
        assert!(gate.should_refresh_at(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn gates_share_frame_boundaries() {
        let control = ThrottleControl::new(20);
        let mut a = control.gate();
        let mut b = control.gate();
        let t = control.epoch + Duration::from_millis(60);

        assert!(a.should_refresh_at(t));
        assert!(b.should_refresh_at(t + Duration::from_millis(10)));
        // Both now sit in frame 1 and wait for frame 2 at 100 ms.
        assert!(!a.should_refresh_at(control.epoch + Duration::from_millis(99)));
        assert!(!b.should_refresh_at(control.epoch + Duration::from_millis(99)));
        assert!(a.should_refresh_at(control.epoch + Duration::from_millis(100)));
        assert!(b.should_refresh_at(control.epoch + Duration::from_millis(100)));
    }

    #[test]
    fn cpu_burn_disables_gating() {
        let control = ThrottleControl::new(1);
        let mut gate = control.gate();
        control.set_cpu_burn(true);

        let t = control.epoch;
        assert!((0..100).all(|_| gate.should_refresh_at(t)));

        control.set_cpu_burn(false);
        assert!(gate.should_refresh_at(t));
        assert!(!gate.should_refresh_at(t));
    }

    #[test]
    fn rate_change_applies_to_all_gates() {
        let control = ThrottleControl::new(THROTTLE_DEFAULT_RATE);
        let gate = control.gate();
        control.set_rate(60);
        assert_eq!(gate.control().rate(), 60);

        control.set_rate(0);
        assert_eq!(control.rate(), 1);
    }
}
