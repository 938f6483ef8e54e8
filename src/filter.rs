//! Time-varying biquad filters.
//!
//! Wraps the `biquad` crate's `DirectForm2Transposed` sections with the two
//! modulation sources the voices need: a slow sine LFO on the cutoff (pads,
//! drones) and a breakpoint sweep (wind gusts, whooshes). Coefficients are
//! recomputed at control rate, every 32 samples, which is far below audible
//! zipper for the sub-hertz modulators used here.

use crate::envelope::PathInterp;
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};

const COEFF_REFRESH: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Bandpass,
}

struct CutoffLfo {
    rate_hz: f32,
    depth_hz: f32,
}

pub struct MovingFilter {
    kind: FilterKind,
    sample_rate: f32,
    base_cutoff: f32,
    q: f32,
    lfo: Option<CutoffLfo>,
    sweep: Option<PathInterp>,
    inner: DirectForm2Transposed<f32>,
    t: f32,
    until_refresh: u32,
}

impl MovingFilter {
    pub fn new(kind: FilterKind, cutoff_hz: f32, q: f32, sample_rate: f32) -> Self {
        let q = q.clamp(0.05, 30.0);
        let coeffs = Self::coefficients(kind, cutoff_hz, q, sample_rate);
        Self {
            kind,
            sample_rate,
            base_cutoff: cutoff_hz,
            q,
            lfo: None,
            sweep: None,
            inner: DirectForm2Transposed::<f32>::new(coeffs),
            t: 0.0,
            until_refresh: COEFF_REFRESH,
        }
    }

    /// Sine LFO on the cutoff: `cutoff + sin(2*pi*rate*t) * depth`.
    pub fn with_lfo(mut self, rate_hz: f32, depth_hz: f32) -> Self {
        self.lfo = Some(CutoffLfo { rate_hz, depth_hz });
        self
    }

    /// Breakpoint sweep of the cutoff over the voice's lifetime. Overrides
    /// the base cutoff while active.
    pub fn with_sweep(mut self, path: PathInterp) -> Self {
        self.sweep = Some(path);
        self
    }

    fn coefficients(
        kind: FilterKind,
        cutoff_hz: f32,
        q: f32,
        sample_rate: f32,
    ) -> Coefficients<f32> {
        // Keep the center frequency strictly inside (0, nyquist) so
        // from_params cannot fail.
        let cutoff = cutoff_hz.clamp(20.0, sample_rate * 0.45);
        let ty = match kind {
            FilterKind::Lowpass => Type::LowPass,
            FilterKind::Bandpass => Type::BandPass,
        };
        Coefficients::<f32>::from_params(ty, sample_rate.hz(), cutoff.hz(), q).unwrap()
    }

    pub fn run(&mut self, input: f32) -> f32 {
        if self.lfo.is_some() || self.sweep.is_some() {
            self.t += 1.0 / self.sample_rate;
            self.until_refresh -= 1;
            if self.until_refresh == 0 {
                self.until_refresh = COEFF_REFRESH;
                let mut cutoff = match &self.sweep {
                    Some(path) => path.value_at(self.t),
                    None => self.base_cutoff,
                };
                if let Some(lfo) = &self.lfo {
                    cutoff +=
                        (self.t * lfo.rate_hz * std::f32::consts::TAU).sin() * lfo.depth_hz;
                }
                let coeffs = Self::coefficients(self.kind, cutoff, self.q, self.sample_rate);
                self.inner.update_coefficients(coeffs);
            }
        }
        self.inner.run(input)
    }
}
