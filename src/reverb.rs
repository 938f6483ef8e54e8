//! Convolution reverb with a generated impulse response.
//!
//! The hall is not sampled from anywhere: the impulse response is 2.5
//! seconds of exponentially decaying stereo noise, energy-normalized so the
//! wet level is independent of sample rate. Convolution runs as partitioned
//! overlap-add in the frequency domain (512-sample blocks), which keeps the
//! per-sample cost flat no matter how long the tail is. The dry path is not
//! delayed; the wet path carries one block of latency, inaudible for a
//! reverb tail.

use rand::rngs::SmallRng;
use rand::Rng;
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

/// Share of the synth submix routed into the reverb.
pub const REVERB_SEND: f32 = 0.3;
/// Wet return level.
pub const REVERB_WET: f32 = 0.15;

const BLOCK: usize = 512;
const FFT_LEN: usize = BLOCK * 2;
const IR_SECONDS: f32 = 2.5;

#[derive(Debug, Error)]
pub enum ReverbError {
    #[error("fft error: {0}")]
    Fft(#[from] realfft::FftError),
}

/// Generate the stereo impulse response: decaying noise with a time
/// constant of two thirds of a second.
pub fn generate_impulse(sample_rate: f32, rng: &mut SmallRng) -> (Vec<f32>, Vec<f32>) {
    let frames = (sample_rate * IR_SECONDS) as usize;
    let tau = sample_rate * 2.0 / 3.0;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for i in 0..frames {
        let decay = (-(i as f32) / tau).exp();
        left.push(rng.gen_range(-1.0f32..1.0) * decay);
        right.push(rng.gen_range(-1.0f32..1.0) * decay);
    }
    // Energy normalization, as a convolver node would apply.
    let power = (left.iter().map(|s| s * s).sum::<f32>()
        + right.iter().map(|s| s * s).sum::<f32>())
        / 2.0;
    if power > 0.0 {
        let scale = 1.0 / power.sqrt();
        for s in left.iter_mut().chain(right.iter_mut()) {
            *s *= scale;
        }
    }
    (left, right)
}

/// Mono-in, stereo-out partitioned convolver.
pub struct ConvolverReverb {
    fft: Arc<dyn RealToComplex<f32>>,
    ifft: Arc<dyn ComplexToReal<f32>>,
    parts_l: Vec<Vec<Complex<f32>>>,
    parts_r: Vec<Vec<Complex<f32>>>,
    // Spectra of past input blocks, newest first.
    history: VecDeque<Vec<Complex<f32>>>,
    input: Vec<f32>,
    in_pos: usize,
    out_l: Vec<f32>,
    out_r: Vec<f32>,
    out_pos: usize,
    overlap_l: Vec<f32>,
    overlap_r: Vec<f32>,
    acc_l: Vec<Complex<f32>>,
    acc_r: Vec<Complex<f32>>,
    time_scratch: Vec<f32>,
    wet: f32,
}

impl ConvolverReverb {
    pub fn new(sample_rate: f32, rng: &mut SmallRng) -> Result<Self, ReverbError> {
        let (ir_l, ir_r) = generate_impulse(sample_rate, rng);
        Self::from_impulse(&ir_l, &ir_r)
    }

    pub fn from_impulse(ir_l: &[f32], ir_r: &[f32]) -> Result<Self, ReverbError> {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_LEN);
        let ifft = planner.plan_fft_inverse(FFT_LEN);

        let partition = |ir: &[f32]| -> Result<Vec<Vec<Complex<f32>>>, ReverbError> {
            let mut parts = Vec::with_capacity(ir.len().div_ceil(BLOCK));
            for chunk in ir.chunks(BLOCK) {
                let mut padded = vec![0.0f32; FFT_LEN];
                padded[..chunk.len()].copy_from_slice(chunk);
                let mut spectrum = fft.make_output_vec();
                fft.process(&mut padded, &mut spectrum)?;
                parts.push(spectrum);
            }
            Ok(parts)
        };

        let parts_l = partition(ir_l)?;
        let parts_r = partition(ir_r)?;
        let spectrum_len = FFT_LEN / 2 + 1;

        Ok(Self {
            fft,
            ifft,
            history: VecDeque::with_capacity(parts_l.len()),
            parts_l,
            parts_r,
            input: vec![0.0; BLOCK],
            in_pos: 0,
            out_l: vec![0.0; BLOCK],
            out_r: vec![0.0; BLOCK],
            out_pos: 0,
            overlap_l: vec![0.0; BLOCK],
            overlap_r: vec![0.0; BLOCK],
            acc_l: vec![Complex::new(0.0, 0.0); spectrum_len],
            acc_r: vec![Complex::new(0.0, 0.0); spectrum_len],
            time_scratch: vec![0.0; FFT_LEN],
            wet: REVERB_WET,
        })
    }

    /// Feed one mono sample, get the stereo wet return.
    pub fn tick(&mut self, input: f32) -> (f32, f32) {
        let l = self.out_l[self.out_pos];
        let r = self.out_r[self.out_pos];
        self.out_pos += 1;

        self.input[self.in_pos] = input;
        self.in_pos += 1;
        if self.in_pos == BLOCK {
            self.process_block();
            self.in_pos = 0;
            self.out_pos = 0;
        }
        (l * self.wet, r * self.wet)
    }

    fn process_block(&mut self) {
        // Spectrum of the new input block. Buffers are recycled from the
        // tail of the history once it is full.
        let mut spectrum = if self.history.len() == self.parts_l.len() {
            match self.history.pop_back() {
                Some(buf) => buf,
                None => self.fft.make_output_vec(),
            }
        } else {
            self.fft.make_output_vec()
        };
        self.time_scratch[..BLOCK].copy_from_slice(&self.input);
        self.time_scratch[BLOCK..].fill(0.0);
        // Lengths are fixed at construction, process cannot fail.
        let _ = self.fft.process(&mut self.time_scratch, &mut spectrum);
        self.history.push_front(spectrum);

        for acc in self.acc_l.iter_mut().chain(self.acc_r.iter_mut()) {
            *acc = Complex::new(0.0, 0.0);
        }
        for (p, in_spec) in self.history.iter().enumerate() {
            let pl = &self.parts_l[p];
            let pr = &self.parts_r[p];
            for k in 0..in_spec.len() {
                self.acc_l[k] += in_spec[k] * pl[k];
                self.acc_r[k] += in_spec[k] * pr[k];
            }
        }
        // The inverse transform requires purely real DC and nyquist bins.
        let last = self.acc_l.len() - 1;
        self.acc_l[0].im = 0.0;
        self.acc_l[last].im = 0.0;
        self.acc_r[0].im = 0.0;
        self.acc_r[last].im = 0.0;

        let norm = 1.0 / FFT_LEN as f32;
        let _ = self.ifft.process(&mut self.acc_l, &mut self.time_scratch);
        for i in 0..BLOCK {
            self.out_l[i] = (self.time_scratch[i] * norm) + self.overlap_l[i];
            self.overlap_l[i] = self.time_scratch[BLOCK + i] * norm;
        }
        let _ = self.ifft.process(&mut self.acc_r, &mut self.time_scratch);
        for i in 0..BLOCK {
            self.out_r[i] = (self.time_scratch[i] * norm) + self.overlap_r[i];
            self.overlap_r[i] = self.time_scratch[BLOCK + i] * norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn impulse_response_decays() {
        let mut rng = SmallRng::seed_from_u64(7);
        let (l, r) = generate_impulse(44100.0, &mut rng);
        assert_eq!(l.len(), (44100.0 * 2.5) as usize);
        assert_eq!(l.len(), r.len());
        let head: f32 = l[..1000].iter().map(|s| s * s).sum();
        let tail: f32 = l[l.len() - 1000..].iter().map(|s| s * s).sum();
        assert!(head > tail * 100.0);
    }

    #[test]
    fn convolution_reproduces_impulse() {
        // Convolving a unit impulse must give back the IR (times wet gain)
        // after one block of latency.
        let ir_l: Vec<f32> = (0..2048).map(|i| ((i * 37) % 101) as f32 / 101.0 - 0.5).collect();
        let ir_r: Vec<f32> = (0..2048).map(|i| ((i * 53) % 89) as f32 / 89.0 - 0.5).collect();
        let mut rv = ConvolverReverb::from_impulse(&ir_l, &ir_r).unwrap();
        let mut out_l = Vec::new();
        let mut out_r = Vec::new();
        for n in 0..(BLOCK + 1024) {
            let x = if n == 0 { 1.0 } else { 0.0 };
            let (l, r) = rv.tick(x);
            out_l.push(l);
            out_r.push(r);
        }
        for i in 0..1024 {
            assert!(
                (out_l[BLOCK + i] - ir_l[i] * REVERB_WET).abs() < 1e-3,
                "left sample {i} diverged"
            );
            assert!(
                (out_r[BLOCK + i] - ir_r[i] * REVERB_WET).abs() < 1e-3,
                "right sample {i} diverged"
            );
        }
    }

    #[test]
    fn silence_in_silence_out() {
        let mut rng = SmallRng::seed_from_u64(11);
        let mut rv = ConvolverReverb::new(8000.0, &mut rng).unwrap();
        for _ in 0..4096 {
            let (l, r) = rv.tick(0.0);
            assert_eq!(l, 0.0);
            assert_eq!(r, 0.0);
        }
    }
}
