//! Synth voices.
//!
//! Every sound the synth layer makes is a `VoiceNode` on the synth bus:
//! short-lived one-shots (tones, noise bursts) that report `finished` and
//! get reaped by the mixer, and continuous voices (pads, drones, noise
//! beds) that run until the bus is torn down.
//!
//! Voices are built from plain spec structs with `Default` impls, so call
//! sites read like the parameter bags they come from: fill in what matters,
//! take the rest as defaults.

use crate::envelope::{OneShotEnv, PathInterp};
use crate::filter::{FilterKind, MovingFilter};
use crate::noise::{noise_buffer, shaped_burst, NoiseColor};
use crate::osc::{cents_to_ratio, Oscillator, Waveform};
use rand::rngs::SmallRng;
use std::f32::consts::{FRAC_PI_4, TAU};

/// Constant-power pan. -1 is hard left, 0 center, 1 hard right.
fn pan_stereo(x: f32, pan: f32) -> (f32, f32) {
    let theta = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (x * theta.cos(), x * theta.sin())
}

pub enum VoiceNode {
    Tone(ToneVoice),
    NoiseBurst(NoiseBurstVoice),
    Pad(PadVoice),
    FmPad(FmPad),
    ResonantPad(ResonantPad),
    Drone(Drone),
    NoiseBed(NoiseBed),
}

impl VoiceNode {
    pub fn tick(&mut self) -> (f32, f32) {
        match self {
            VoiceNode::Tone(v) => v.tick(),
            VoiceNode::NoiseBurst(v) => v.tick(),
            VoiceNode::Pad(v) => v.tick(),
            VoiceNode::FmPad(v) => v.tick(),
            VoiceNode::ResonantPad(v) => v.tick(),
            VoiceNode::Drone(v) => v.tick(),
            VoiceNode::NoiseBed(v) => v.tick(),
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            VoiceNode::Tone(v) => v.is_finished(),
            VoiceNode::NoiseBurst(v) => v.is_finished(),
            // Continuous voices live until teardown.
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// One-shot tone

#[derive(Debug, Clone)]
pub struct ToneSpec {
    pub freq: f32,
    pub waveform: Waveform,
    pub gain: f32,
    pub attack: f32,
    pub decay: f32,
    pub filter_freq: f32,
    pub filter_q: f32,
    pub filter_kind: FilterKind,
    /// Detune in cents, applied on top of `freq` or the pitch path.
    pub detune: f32,
    pub pan: f32,
    /// Absolute frequency breakpoints `(secs, hz)`, exponential glide.
    pub pitch_path: Option<Vec<(f32, f32)>>,
    /// Gain breakpoints replacing the attack/decay envelope.
    pub gain_path: Option<Vec<(f32, f32)>>,
    /// Cutoff breakpoints `(secs, hz)`, exponential sweep.
    pub filter_sweep: Option<Vec<(f32, f32)>>,
    /// Linear pan motion `(from, to)` over the voice's lifetime.
    pub pan_sweep: Option<(f32, f32)>,
    /// Pitch vibrato `(rate_hz, depth_hz)`.
    pub vibrato: Option<(f32, f32)>,
}

impl Default for ToneSpec {
    fn default() -> Self {
        Self {
            freq: 440.0,
            waveform: Waveform::Sine,
            gain: 0.02,
            attack: 0.01,
            decay: 2.0,
            filter_freq: 3000.0,
            filter_q: 0.5,
            filter_kind: FilterKind::Lowpass,
            detune: 0.0,
            pan: 0.0,
            pitch_path: None,
            gain_path: None,
            filter_sweep: None,
            pan_sweep: None,
            vibrato: None,
        }
    }
}

enum ToneEnv {
    Shot(OneShotEnv),
    Path { path: PathInterp, end: f32 },
}

pub struct ToneVoice {
    osc: Oscillator,
    freq: f32,
    detune_ratio: f32,
    pitch: Option<PathInterp>,
    vibrato: Option<(f32, f32)>,
    env: ToneEnv,
    filter: MovingFilter,
    pan: f32,
    pan_sweep: Option<(f32, f32)>,
    lifetime: f32,
    t: f32,
    dt: f32,
}

impl ToneVoice {
    pub fn new(spec: ToneSpec, sample_rate: f32) -> Self {
        let env = match spec.gain_path {
            Some(points) => {
                let path = PathInterp::linear(points);
                let end = path.end_time();
                ToneEnv::Path { path, end }
            }
            None => ToneEnv::Shot(OneShotEnv::new(
                spec.gain,
                spec.attack,
                spec.decay,
                sample_rate,
            )),
        };
        let lifetime = match &env {
            ToneEnv::Shot(_) => spec.attack + spec.decay,
            ToneEnv::Path { end, .. } => *end,
        };
        let mut filter = MovingFilter::new(spec.filter_kind, spec.filter_freq, spec.filter_q, sample_rate);
        if let Some(points) = spec.filter_sweep {
            filter = filter.with_sweep(PathInterp::exponential(points));
        }
        Self {
            osc: Oscillator::new(spec.waveform, sample_rate),
            freq: spec.freq,
            detune_ratio: cents_to_ratio(spec.detune),
            pitch: spec.pitch_path.map(PathInterp::exponential),
            vibrato: spec.vibrato,
            env,
            filter,
            pan: spec.pan,
            pan_sweep: spec.pan_sweep,
            lifetime,
            t: 0.0,
            dt: 1.0 / sample_rate,
        }
    }

    fn tick(&mut self) -> (f32, f32) {
        let mut freq = match &self.pitch {
            Some(path) => path.value_at(self.t),
            None => self.freq,
        } * self.detune_ratio;
        if let Some((rate, depth)) = self.vibrato {
            freq += (self.t * rate * TAU).sin() * depth;
        }
        let gain = match &mut self.env {
            ToneEnv::Shot(env) => env.tick(),
            ToneEnv::Path { path, .. } => path.value_at(self.t),
        };
        let x = self.filter.run(self.osc.tick(freq) * gain);
        let pan = match self.pan_sweep {
            Some((from, to)) => {
                let u = (self.t / self.lifetime.max(1e-3)).clamp(0.0, 1.0);
                from + (to - from) * u
            }
            None => self.pan,
        };
        self.t += self.dt;
        pan_stereo(x, pan)
    }

    fn is_finished(&self) -> bool {
        match &self.env {
            ToneEnv::Shot(env) => env.is_finished(),
            ToneEnv::Path { end, .. } => self.t > end + 0.05,
        }
    }
}

// ---------------------------------------------------------------------------
// Noise burst

#[derive(Debug, Clone)]
pub struct NoiseBurstSpec {
    pub color: NoiseColor,
    pub duration: f32,
    pub gain: f32,
    pub filter_freq: f32,
    pub filter_q: f32,
    pub filter_kind: FilterKind,
    pub pan: f32,
    /// Bake the rise/hold/fall burst envelope into the buffer. Turn off
    /// when a `gain_path` supplies the whole shape.
    pub shaped: bool,
    pub gain_path: Option<Vec<(f32, f32)>>,
    pub filter_sweep: Option<Vec<(f32, f32)>>,
    pub pan_sweep: Option<(f32, f32)>,
}

impl Default for NoiseBurstSpec {
    fn default() -> Self {
        Self {
            color: NoiseColor::Pink,
            duration: 0.5,
            gain: 0.01,
            filter_freq: 1000.0,
            filter_q: 1.0,
            filter_kind: FilterKind::Bandpass,
            pan: 0.0,
            shaped: true,
            gain_path: None,
            filter_sweep: None,
            pan_sweep: None,
        }
    }
}

pub struct NoiseBurstVoice {
    buffer: Vec<f32>,
    pos: usize,
    gain: f32,
    gain_path: Option<PathInterp>,
    filter: MovingFilter,
    pan: f32,
    pan_sweep: Option<(f32, f32)>,
    dt: f32,
}

impl NoiseBurstVoice {
    pub fn new(spec: NoiseBurstSpec, sample_rate: f32, rng: &mut SmallRng) -> Self {
        let frames = (spec.duration * sample_rate).max(1.0) as usize;
        let buffer = if spec.shaped {
            shaped_burst(spec.color, frames, rng)
        } else {
            noise_buffer(spec.color, frames, rng)
        };
        let mut filter =
            MovingFilter::new(spec.filter_kind, spec.filter_freq, spec.filter_q, sample_rate);
        if let Some(points) = spec.filter_sweep {
            filter = filter.with_sweep(PathInterp::exponential(points));
        }
        Self {
            buffer,
            pos: 0,
            gain: spec.gain,
            gain_path: spec.gain_path.map(PathInterp::linear),
            filter,
            pan: spec.pan,
            pan_sweep: spec.pan_sweep,
            dt: 1.0 / sample_rate,
        }
    }

    fn tick(&mut self) -> (f32, f32) {
        if self.pos >= self.buffer.len() {
            return (0.0, 0.0);
        }
        let t = self.pos as f32 * self.dt;
        let gain = match &self.gain_path {
            Some(path) => path.value_at(t),
            None => self.gain,
        };
        let x = self.filter.run(self.buffer[self.pos] * gain);
        let pan = match self.pan_sweep {
            Some((from, to)) => {
                let u = self.pos as f32 / self.buffer.len() as f32;
                from + (to - from) * u
            }
            None => self.pan,
        };
        self.pos += 1;
        pan_stereo(x, pan)
    }

    fn is_finished(&self) -> bool {
        self.pos >= self.buffer.len()
    }
}

// ---------------------------------------------------------------------------
// Pads

#[derive(Debug, Clone)]
pub struct PadSpec {
    pub waveform: Waveform,
    /// Oscillators per chord note.
    pub voices_per_note: usize,
    /// Total detune spread across a note's voices, in cents.
    pub detune_spread: f32,
    pub gain: f32,
    pub filter_freq: f32,
    pub filter_q: f32,
    pub lfo_rate: f32,
    pub lfo_depth: f32,
}

impl Default for PadSpec {
    fn default() -> Self {
        Self {
            waveform: Waveform::Sine,
            voices_per_note: 4,
            detune_spread: 12.0,
            gain: 0.045,
            filter_freq: 800.0,
            filter_q: 0.7,
            lfo_rate: 0.06,
            lfo_depth: 200.0,
        }
    }
}

struct PadOsc {
    osc: Oscillator,
    freq: f32,
}

/// Detuned-unison chorus pad: several slightly detuned oscillators per
/// chord note through one slowly breathing lowpass.
pub struct PadVoice {
    voices: Vec<PadOsc>,
    voice_gain: f32,
    filter: MovingFilter,
}

impl PadVoice {
    pub fn chorus(notes: &[f32], spec: &PadSpec, sample_rate: f32) -> Self {
        let per_note = spec.voices_per_note.max(1);
        let mut voices = Vec::with_capacity(notes.len() * per_note);
        for &note in notes {
            for i in 0..per_note {
                let centered = i as f32 - (per_note as f32 - 1.0) / 2.0;
                let cents = if per_note > 1 {
                    centered * spec.detune_spread / (per_note as f32 - 1.0)
                } else {
                    0.0
                };
                voices.push(PadOsc {
                    osc: Oscillator::new(spec.waveform, sample_rate),
                    freq: note * cents_to_ratio(cents),
                });
            }
        }
        let filter = MovingFilter::new(FilterKind::Lowpass, spec.filter_freq, spec.filter_q, sample_rate)
            .with_lfo(spec.lfo_rate, spec.lfo_depth);
        Self {
            voices,
            voice_gain: spec.gain / per_note as f32,
            filter,
        }
    }

    /// One voice per note, alternately detuned a few cents sharp and flat.
    pub fn simple(notes: &[f32], spec: &PadSpec, sample_rate: f32) -> Self {
        let mut voices = Vec::with_capacity(notes.len());
        for (i, &note) in notes.iter().enumerate() {
            let cents = if i % 2 == 0 { 4.0 } else { -4.0 };
            voices.push(PadOsc {
                osc: Oscillator::new(spec.waveform, sample_rate),
                freq: note * cents_to_ratio(cents),
            });
        }
        let filter = MovingFilter::new(FilterKind::Lowpass, spec.filter_freq, spec.filter_q, sample_rate)
            .with_lfo(spec.lfo_rate, spec.lfo_depth);
        Self {
            voices,
            voice_gain: spec.gain,
            filter,
        }
    }

    fn tick(&mut self) -> (f32, f32) {
        let mut sum = 0.0;
        for v in &mut self.voices {
            sum += v.osc.tick(v.freq);
        }
        let x = self.filter.run(sum * self.voice_gain);
        (x, x)
    }
}

#[derive(Debug, Clone)]
pub struct FmPadSpec {
    pub gain: f32,
    pub filter_freq: f32,
    pub filter_q: f32,
    pub lfo_rate: f32,
    pub lfo_depth: f32,
    /// Modulator frequency as a ratio of the carrier.
    pub mod_ratio: f32,
    /// Peak frequency deviation in Hz.
    pub mod_depth: f32,
}

impl Default for FmPadSpec {
    fn default() -> Self {
        Self {
            gain: 0.045,
            filter_freq: 800.0,
            filter_q: 0.7,
            lfo_rate: 0.06,
            lfo_depth: 200.0,
            mod_ratio: 0.5,
            mod_depth: 12.0,
        }
    }
}

struct FmOp {
    carrier: Oscillator,
    modulator: Oscillator,
    freq: f32,
    mod_freq: f32,
}

/// Bell-ish FM pad: one sine carrier per note, frequency-modulated by a
/// sub-ratio sine.
pub struct FmPad {
    ops: Vec<FmOp>,
    voice_gain: f32,
    mod_depth: f32,
    filter: MovingFilter,
}

impl FmPad {
    pub fn new(notes: &[f32], spec: &FmPadSpec, sample_rate: f32) -> Self {
        let ops = notes
            .iter()
            .map(|&note| FmOp {
                carrier: Oscillator::new(Waveform::Sine, sample_rate),
                modulator: Oscillator::new(Waveform::Sine, sample_rate),
                freq: note,
                mod_freq: note * spec.mod_ratio,
            })
            .collect();
        let filter = MovingFilter::new(FilterKind::Lowpass, spec.filter_freq, spec.filter_q, sample_rate)
            .with_lfo(spec.lfo_rate, spec.lfo_depth);
        Self {
            ops,
            voice_gain: spec.gain,
            mod_depth: spec.mod_depth,
            filter,
        }
    }

    fn tick(&mut self) -> (f32, f32) {
        let mut sum = 0.0;
        for op in &mut self.ops {
            let m = op.modulator.tick(op.mod_freq) * self.mod_depth;
            sum += op.carrier.tick(op.freq + m);
        }
        let x = self.filter.run(sum * self.voice_gain);
        (x, x)
    }
}

#[derive(Debug, Clone)]
pub struct ResonantPadSpec {
    pub gain: f32,
    pub resonance: f32,
    /// Base LFO rate; filter `i` in the chain runs at `rate + i * 0.015` so
    /// the resonances drift out of phase with each other.
    pub lfo_rate: f32,
}

impl Default for ResonantPadSpec {
    fn default() -> Self {
        Self {
            gain: 0.045,
            resonance: 12.0,
            lfo_rate: 0.06,
        }
    }
}

/// Breathy pad: a looped noise bed pushed through a series chain of
/// high-Q bandpasses tuned to the chord.
pub struct ResonantPad {
    bed: Vec<f32>,
    pos: usize,
    gain: f32,
    chain: Vec<MovingFilter>,
}

impl ResonantPad {
    pub fn new(notes: &[f32], spec: &ResonantPadSpec, sample_rate: f32, rng: &mut SmallRng) -> Self {
        let bed = noise_buffer(NoiseColor::Pink, (sample_rate * 2.0) as usize, rng);
        let chain = notes
            .iter()
            .enumerate()
            .map(|(i, &note)| {
                MovingFilter::new(FilterKind::Bandpass, note, spec.resonance, sample_rate)
                    .with_lfo(spec.lfo_rate + i as f32 * 0.015, note * 0.015)
            })
            .collect();
        Self {
            bed,
            pos: 0,
            gain: spec.gain,
            chain,
        }
    }

    fn tick(&mut self) -> (f32, f32) {
        let mut x = self.bed[self.pos] * self.gain;
        self.pos = (self.pos + 1) % self.bed.len();
        for f in &mut self.chain {
            x = f.run(x);
        }
        (x, x)
    }
}

// ---------------------------------------------------------------------------
// Drone and noise bed

#[derive(Debug, Clone)]
pub struct DroneSpec {
    pub waveform: Waveform,
    pub gain: f32,
    pub filter_freq: f32,
    /// Slow pitch wobble `(rate_hz, depth_hz)`.
    pub pitch_lfo: (f32, f32),
    /// Optional tremolo `(rate_hz, depth)` added to the gain.
    pub amp_lfo: Option<(f32, f32)>,
}

impl Default for DroneSpec {
    fn default() -> Self {
        Self {
            waveform: Waveform::Sine,
            gain: 0.035,
            filter_freq: 400.0,
            pitch_lfo: (0.05, 1.5),
            amp_lfo: None,
        }
    }
}

pub struct Drone {
    osc: Oscillator,
    freq: f32,
    gain: f32,
    pitch_lfo: (f32, f32),
    amp_lfo: Option<(f32, f32)>,
    filter: MovingFilter,
    t: f32,
    dt: f32,
}

impl Drone {
    pub fn new(freq: f32, spec: &DroneSpec, sample_rate: f32) -> Self {
        Self {
            osc: Oscillator::new(spec.waveform, sample_rate),
            freq,
            gain: spec.gain,
            pitch_lfo: spec.pitch_lfo,
            amp_lfo: spec.amp_lfo,
            filter: MovingFilter::new(FilterKind::Lowpass, spec.filter_freq, 0.7, sample_rate),
            t: 0.0,
            dt: 1.0 / sample_rate,
        }
    }

    fn tick(&mut self) -> (f32, f32) {
        let (rate, depth) = self.pitch_lfo;
        let freq = self.freq + (self.t * rate * TAU).sin() * depth;
        let mut gain = self.gain;
        if let Some((arate, adepth)) = self.amp_lfo {
            gain += (self.t * arate * TAU).sin() * adepth;
        }
        let x = self.filter.run(self.osc.tick(freq) * gain.max(0.0));
        self.t += self.dt;
        (x, x)
    }
}

#[derive(Debug, Clone)]
pub struct NoiseBedSpec {
    pub color: NoiseColor,
    pub gain: f32,
    pub filter_freq: f32,
    pub filter_q: f32,
}

impl Default for NoiseBedSpec {
    fn default() -> Self {
        Self {
            color: NoiseColor::Pink,
            gain: 0.01,
            filter_freq: 480.0,
            filter_q: 0.5,
        }
    }
}

/// Continuous atmosphere bed: a four-second looped noise buffer through a
/// static lowpass.
pub struct NoiseBed {
    buffer: Vec<f32>,
    pos: usize,
    gain: f32,
    filter: MovingFilter,
}

impl NoiseBed {
    pub fn new(spec: &NoiseBedSpec, sample_rate: f32, rng: &mut SmallRng) -> Self {
        let buffer = noise_buffer(spec.color, (sample_rate * 4.0) as usize, rng);
        Self {
            buffer,
            pos: 0,
            gain: spec.gain,
            filter: MovingFilter::new(FilterKind::Lowpass, spec.filter_freq, spec.filter_q, sample_rate),
        }
    }

    fn tick(&mut self) -> (f32, f32) {
        let x = self.filter.run(self.buffer[self.pos] * self.gain);
        self.pos = (self.pos + 1) % self.buffer.len();
        (x, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    const SR: f32 = 44100.0;

    #[test]
    fn tone_finishes_after_envelope() {
        let mut v = ToneVoice::new(
            ToneSpec {
                freq: 440.0,
                attack: 0.01,
                decay: 0.1,
                ..Default::default()
            },
            SR,
        );
        let mut peak = 0.0f32;
        for _ in 0..(SR * 0.2) as usize {
            let (l, r) = v.tick();
            peak = peak.max(l.abs()).max(r.abs());
        }
        assert!(peak > 0.001, "tone was silent");
        assert!(v.is_finished());
    }

    #[test]
    fn pitch_glide_follows_path() {
        // A glide from 200 to 800 Hz should produce more zero crossings in
        // its second half than its first.
        let mut v = ToneVoice::new(
            ToneSpec {
                gain: 0.5,
                attack: 0.01,
                decay: 2.0,
                filter_freq: 8000.0,
                pitch_path: Some(vec![(0.0, 200.0), (1.0, 800.0)]),
                ..Default::default()
            },
            SR,
        );
        let samples: Vec<f32> = (0..SR as usize).map(|_| v.tick().0).collect();
        let crossings = |s: &[f32]| {
            s.windows(2).filter(|w| w[0] <= 0.0 && w[1] > 0.0).count()
        };
        let first = crossings(&samples[..SR as usize / 2]);
        let second = crossings(&samples[SR as usize / 2..]);
        assert!(
            second as f32 > first as f32 * 1.8,
            "first={first} second={second}"
        );
    }

    #[test]
    fn pan_sweep_moves_energy_between_channels() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut v = NoiseBurstVoice::new(
            NoiseBurstSpec {
                duration: 1.0,
                gain: 0.5,
                pan_sweep: Some((-1.0, 1.0)),
                filter_freq: 2000.0,
                ..Default::default()
            },
            SR,
            &mut rng,
        );
        let mut first_l = 0.0f32;
        let mut first_r = 0.0f32;
        let mut last_l = 0.0f32;
        let mut last_r = 0.0f32;
        for i in 0..SR as usize {
            let (l, r) = v.tick();
            if i < SR as usize / 4 {
                first_l += l * l;
                first_r += r * r;
            } else if i > 3 * SR as usize / 4 {
                last_l += l * l;
                last_r += r * r;
            }
        }
        assert!(first_l > first_r * 10.0);
        assert!(last_r > last_l * 10.0);
        assert!(v.is_finished());
    }

    #[test]
    fn continuous_voices_never_finish() {
        let mut rng = SmallRng::seed_from_u64(4);
        let notes = [220.0, 277.0, 330.0];
        let nodes = [
            VoiceNode::Pad(PadVoice::chorus(&notes, &PadSpec::default(), SR)),
            VoiceNode::FmPad(FmPad::new(&notes, &FmPadSpec::default(), SR)),
            VoiceNode::ResonantPad(ResonantPad::new(
                &notes,
                &ResonantPadSpec::default(),
                SR,
                &mut rng,
            )),
            VoiceNode::Drone(Drone::new(110.0, &DroneSpec::default(), SR)),
            VoiceNode::NoiseBed(NoiseBed::new(&NoiseBedSpec::default(), SR, &mut rng)),
        ];
        for mut node in nodes {
            for _ in 0..4096 {
                let (l, r) = node.tick();
                assert!(l.is_finite() && r.is_finite());
            }
            assert!(!node.is_finished());
        }
    }

    #[test]
    fn chorus_pad_produces_output() {
        let mut pad = PadVoice::chorus(&[220.0, 277.0, 330.0], &PadSpec::default(), SR);
        let mut energy = 0.0;
        for _ in 0..44100 {
            let (l, _) = pad.tick();
            energy += l * l;
        }
        assert!(energy > 0.01);
    }
}
