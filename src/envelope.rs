//! Envelopes and breakpoint paths.
//!
//! One-shot synth voices use a linear attack followed by an exponential
//! decay toward a -80 dB floor, which reads as a natural fade rather than
//! the audible tail a linear decay leaves. Effects that need arbitrary
//! shapes (wave cycles, whale calls, bird chirps) use breakpoint paths
//! with either linear or exponential interpolation between points.

/// Decay floor. Exponential ramps cannot reach zero, so decays head here
/// and the voice is reaped shortly after.
pub const DECAY_FLOOR: f32 = 0.0001;

/// Linear attack to `peak`, then exponential decay to [`DECAY_FLOOR`].
#[derive(Debug, Clone)]
pub struct OneShotEnv {
    peak: f32,
    attack: f32,
    decay: f32,
    t: f32,
    dt: f32,
}

impl OneShotEnv {
    pub fn new(peak: f32, attack_secs: f32, decay_secs: f32, sample_rate: f32) -> Self {
        Self {
            peak: peak.max(DECAY_FLOOR),
            attack: attack_secs.max(1e-4),
            decay: decay_secs.max(1e-3),
            t: 0.0,
            dt: 1.0 / sample_rate,
        }
    }

    pub fn tick(&mut self) -> f32 {
        let t = self.t;
        self.t += self.dt;
        if t < self.attack {
            self.peak * (t / self.attack)
        } else {
            let u = ((t - self.attack) / self.decay).min(1.0);
            self.peak * (DECAY_FLOOR / self.peak).powf(u)
        }
    }

    /// True once the decay has run its course (plus a short slack so the
    /// final ramp samples are not cut off).
    pub fn is_finished(&self) -> bool {
        self.t >= self.attack + self.decay + 0.05
    }
}

/// Piecewise interpolation between `(time_secs, value)` breakpoints.
///
/// Before the first point the first value holds; after the last point the
/// last value holds. Exponential paths fall back to linear when either
/// endpoint of a segment is non-positive.
#[derive(Debug, Clone)]
pub struct PathInterp {
    points: Vec<(f32, f32)>,
    exponential: bool,
}

impl PathInterp {
    pub fn linear(points: Vec<(f32, f32)>) -> Self {
        Self {
            points,
            exponential: false,
        }
    }

    pub fn exponential(points: Vec<(f32, f32)>) -> Self {
        Self {
            points,
            exponential: true,
        }
    }

    pub fn value_at(&self, t: f32) -> f32 {
        let pts = &self.points;
        if pts.is_empty() {
            return 0.0;
        }
        if t <= pts[0].0 {
            return pts[0].1;
        }
        for pair in pts.windows(2) {
            let (t0, v0) = pair[0];
            let (t1, v1) = pair[1];
            if t < t1 {
                let span = (t1 - t0).max(1e-6);
                let u = (t - t0) / span;
                return if self.exponential && v0 > 0.0 && v1 > 0.0 {
                    v0 * (v1 / v0).powf(u)
                } else {
                    v0 + (v1 - v0) * u
                };
            }
        }
        pts[pts.len() - 1].1
    }

    /// Time of the final breakpoint.
    pub fn end_time(&self) -> f32 {
        self.points.last().map(|p| p.0).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_rises_then_falls() {
        let sr = 1000.0;
        let mut env = OneShotEnv::new(0.5, 0.1, 0.5, sr);
        let samples: Vec<f32> = (0..700).map(|_| env.tick()).collect();
        // Peak reached at the attack boundary.
        let peak = samples.iter().cloned().fold(0.0f32, f32::max);
        assert!((peak - 0.5).abs() < 0.01);
        // Strictly rising through the attack.
        assert!(samples[50] > samples[10]);
        // Decayed to near the floor at the end.
        assert!(samples[650] < 0.001);
        assert!(env.is_finished());
    }

    #[test]
    fn linear_path_holds_endpoints() {
        let p = PathInterp::linear(vec![(0.5, 1.0), (1.5, 3.0)]);
        assert_eq!(p.value_at(0.0), 1.0);
        assert!((p.value_at(1.0) - 2.0).abs() < 1e-5);
        assert_eq!(p.value_at(2.0), 3.0);
        assert_eq!(p.end_time(), 1.5);
    }

    #[test]
    fn exponential_path_is_geometric() {
        let p = PathInterp::exponential(vec![(0.0, 100.0), (1.0, 400.0)]);
        assert!((p.value_at(0.5) - 200.0).abs() < 0.5);
    }

    #[test]
    fn exponential_path_with_zero_endpoint_falls_back() {
        let p = PathInterp::exponential(vec![(0.0, 0.0), (1.0, 1.0)]);
        assert!((p.value_at(0.5) - 0.5).abs() < 1e-5);
    }
}
