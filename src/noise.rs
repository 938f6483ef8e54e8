//! Noise buffer generation.
//!
//! Noise is rendered into buffers up front on the control thread rather than
//! generated per sample in the audio callback. White is uniform, pink uses
//! the Paul Kellet filter network, brown is a leaky integrator over white.

use rand::rngs::SmallRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseColor {
    White,
    #[default]
    Pink,
    Brown,
}

/// Fill a mono buffer with `frames` samples of the requested color, roughly
/// normalized to the [-1, 1] range.
pub fn noise_buffer(color: NoiseColor, frames: usize, rng: &mut SmallRng) -> Vec<f32> {
    let mut out = Vec::with_capacity(frames);
    match color {
        NoiseColor::White => {
            for _ in 0..frames {
                out.push(rng.gen_range(-1.0f32..1.0));
            }
        }
        NoiseColor::Pink => {
            let (mut b0, mut b1, mut b2, mut b3, mut b4, mut b5, mut b6) =
                (0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32);
            for _ in 0..frames {
                let white = rng.gen_range(-1.0f32..1.0);
                b0 = 0.99886 * b0 + white * 0.0555179;
                b1 = 0.99332 * b1 + white * 0.0750759;
                b2 = 0.96900 * b2 + white * 0.1538520;
                b3 = 0.86650 * b3 + white * 0.3104856;
                b4 = 0.55000 * b4 + white * 0.5329522;
                b5 = -0.7616 * b5 - white * 0.0168980;
                let pink = b0 + b1 + b2 + b3 + b4 + b5 + b6 + white * 0.5362;
                b6 = white * 0.115926;
                out.push(pink * 0.11);
            }
        }
        NoiseColor::Brown => {
            let mut last = 0.0f32;
            for _ in 0..frames {
                let white = rng.gen_range(-1.0f32..1.0);
                last = (last + 0.02 * white) / 1.02;
                out.push(last * 3.5);
            }
        }
    }
    out
}

/// Noise buffer with a burst envelope baked in: linear rise over the first
/// 20%, hold through 70%, linear fall to zero over the last 30%.
pub fn shaped_burst(color: NoiseColor, frames: usize, rng: &mut SmallRng) -> Vec<f32> {
    let mut buf = noise_buffer(color, frames, rng);
    let n = frames as f32;
    for (i, s) in buf.iter_mut().enumerate() {
        let t = i as f32 / n;
        let env = if t < 0.2 {
            t / 0.2
        } else if t < 0.7 {
            1.0
        } else {
            (1.0 - t) / 0.3
        };
        *s *= env;
    }
    buf
}
