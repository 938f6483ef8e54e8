//! Sample-accurate smoothed parameters.
//!
//! Every audible gain change in the engine goes through a ramp rather than a
//! jump. `SmoothedParam` is the one primitive behind master fades, volume
//! changes and submix levels: set a target and a duration, then pull one
//! value per sample from the audio thread.

/// A scalar parameter that moves linearly toward its target over a fixed
/// number of samples.
#[derive(Debug, Clone)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl SmoothedParam {
    pub fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Jump immediately, cancelling any ramp in flight.
    pub fn set(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.remaining = 0;
    }

    /// Ramp from the current value to `target` over `seconds`.
    ///
    /// A ramp started mid-ramp departs from wherever the previous ramp got
    /// to, never from the old target.
    pub fn ramp_to(&mut self, target: f32, seconds: f32, sample_rate: f32) {
        let samples = (seconds * sample_rate).max(1.0) as u32;
        self.target = target;
        self.step = (target - self.current) / samples as f32;
        self.remaining = samples;
    }

    /// Advance one sample and return the new value.
    pub fn tick(&mut self) -> f32 {
        if self.remaining > 0 {
            self.current += self.step;
            self.remaining -= 1;
            if self.remaining == 0 {
                self.current = self.target;
            }
        }
        self.current
    }

    /// Current value without advancing.
    pub fn value(&self) -> f32 {
        self.current
    }

    /// Final value the parameter is heading toward.
    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_lands_exactly_on_target() {
        let mut p = SmoothedParam::new(0.0);
        p.ramp_to(0.3, 0.01, 1000.0); // 10 samples
        let mut last = 0.0;
        for _ in 0..10 {
            last = p.tick();
        }
        assert_eq!(last, 0.3);
        assert!(!p.is_ramping());
    }

    #[test]
    fn ramp_is_monotonic() {
        let mut p = SmoothedParam::new(1.0);
        p.ramp_to(0.0, 0.1, 100.0);
        let mut prev = 1.0;
        for _ in 0..10 {
            let v = p.tick();
            assert!(v <= prev);
            prev = v;
        }
        assert_eq!(prev, 0.0);
    }

    #[test]
    fn retarget_mid_ramp_departs_from_current() {
        let mut p = SmoothedParam::new(0.0);
        p.ramp_to(1.0, 1.0, 100.0);
        for _ in 0..50 {
            p.tick();
        }
        let mid = p.value();
        assert!(mid > 0.4 && mid < 0.6);
        p.ramp_to(0.0, 1.0, 100.0);
        let first = p.tick();
        assert!(first < mid && first > mid - 0.02);
    }

    #[test]
    fn set_cancels_ramp() {
        let mut p = SmoothedParam::new(0.0);
        p.ramp_to(1.0, 1.0, 44100.0);
        p.set(0.42);
        assert_eq!(p.tick(), 0.42);
        assert!(!p.is_ramping());
    }
}
