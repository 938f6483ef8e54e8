//! The mixer graph.
//!
//! Mirrors the bus layout the whole engine is organized around:
//!
//! ```text
//! synth voices ──┬─> synth bus ────────────┬─> master ─> output
//!                └─> send ─> reverb (wet) ─┤
//! soundscape loops ─> soundscape bus ──────┤
//! music loops ─────> music bus ────────────┘
//! ```
//!
//! The master gain is persistent and survives play cycles; the three buses
//! and the reverb are per-cycle and are dropped wholesale on teardown,
//! which is what makes stop() reliable: there is no per-voice cleanup to
//! forget.
//!
//! The graph sits behind a mutex shared with the audio callback. Control
//! paths hold the lock briefly (push a voice, start a ramp); only
//! `render` does per-sample work.

use crate::loops::DecodedAudio;
use crate::param::SmoothedParam;
use crate::reverb::{ConvolverReverb, REVERB_SEND};
use crate::voice::VoiceNode;
use std::sync::Arc;

/// A looping sample player on the soundscape or music bus. Resampling is
/// linear, driven by the ratio of file rate to engine rate.
pub struct LoopVoice {
    audio: Arc<DecodedAudio>,
    pos: f64,
    step: f64,
    gain: f32,
}

impl LoopVoice {
    pub fn new(audio: Arc<DecodedAudio>, gain: f32, engine_rate: f32) -> Self {
        let step = audio.sample_rate as f64 / engine_rate as f64;
        Self {
            audio,
            pos: 0.0,
            step,
            gain,
        }
    }

    fn tick(&mut self) -> (f32, f32) {
        let frames = self.audio.frames.len();
        if frames == 0 {
            return (0.0, 0.0);
        }
        let i = self.pos as usize;
        let frac = (self.pos - i as f64) as f32;
        let a = self.audio.frames[i % frames];
        let b = self.audio.frames[(i + 1) % frames];
        let l = a[0] + (b[0] - a[0]) * frac;
        let r = a[1] + (b[1] - a[1]) * frac;
        self.pos += self.step;
        if self.pos >= frames as f64 {
            self.pos -= frames as f64;
        }
        (l * self.gain, r * self.gain)
    }
}

struct Buses {
    synth: Vec<VoiceNode>,
    soundscape: Vec<LoopVoice>,
    music: Vec<LoopVoice>,
    reverb: Option<ConvolverReverb>,
    reverb_send: f32,
}

pub struct MixerGraph {
    sample_rate: f32,
    master: SmoothedParam,
    buses: Option<Buses>,
}

impl MixerGraph {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            master: SmoothedParam::new(0.0),
            buses: None,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Stand up a fresh set of buses for a play cycle. Any previous buses
    /// are dropped first.
    pub(crate) fn build_buses(&mut self, reverb: Option<ConvolverReverb>) {
        self.buses = Some(Buses {
            synth: Vec::new(),
            soundscape: Vec::new(),
            music: Vec::new(),
            reverb,
            reverb_send: REVERB_SEND,
        });
    }

    /// Drop every per-cycle node. The master gain survives.
    pub(crate) fn teardown_buses(&mut self) {
        self.buses = None;
    }

    /// Add a synth voice to the current cycle. A voice arriving after
    /// teardown (a stale async producer) is dropped on the floor.
    pub(crate) fn add_voice(&mut self, voice: VoiceNode) {
        if let Some(buses) = &mut self.buses {
            buses.synth.push(voice);
        }
    }

    pub(crate) fn add_soundscape_loop(&mut self, voice: LoopVoice) {
        if let Some(buses) = &mut self.buses {
            buses.soundscape.push(voice);
        }
    }

    pub(crate) fn add_music_loop(&mut self, voice: LoopVoice) {
        if let Some(buses) = &mut self.buses {
            buses.music.push(voice);
        }
    }

    pub fn set_master(&mut self, value: f32) {
        self.master.set(value);
    }

    pub fn fade_master_to(&mut self, target: f32, seconds: f32) {
        self.master.ramp_to(target, seconds, self.sample_rate);
    }

    pub fn master_value(&self) -> f32 {
        self.master.value()
    }

    /// Live synth voices, one-shots included. Diagnostic; also the hook the
    /// lifecycle tests use to prove teardown left nothing behind.
    pub fn synth_voice_count(&self) -> usize {
        self.buses.as_ref().map_or(0, |b| b.synth.len())
    }

    /// Active loop players across the soundscape and music buses.
    pub fn loop_source_count(&self) -> usize {
        self.buses
            .as_ref()
            .map_or(0, |b| b.soundscape.len() + b.music.len())
    }

    /// Render interleaved samples into `out`. With more than two channels
    /// the stereo pair lands in channels 0 and 1 and the rest stay silent;
    /// with one channel the output is the mono sum.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        for frame in out.chunks_mut(channels) {
            let (mut l, mut r) = (0.0f32, 0.0f32);
            if let Some(buses) = &mut self.buses {
                let (mut sl, mut sr) = (0.0f32, 0.0f32);
                for v in &mut buses.synth {
                    let (vl, vr) = v.tick();
                    sl += vl;
                    sr += vr;
                }
                l += sl;
                r += sr;
                if let Some(reverb) = &mut buses.reverb {
                    let send = (sl + sr) * 0.5 * buses.reverb_send;
                    let (wl, wr) = reverb.tick(send);
                    l += wl;
                    r += wr;
                }
                for v in &mut buses.soundscape {
                    let (vl, vr) = v.tick();
                    l += vl;
                    r += vr;
                }
                for v in &mut buses.music {
                    let (vl, vr) = v.tick();
                    l += vl;
                    r += vr;
                }
            }
            let m = self.master.tick();
            l *= m;
            r *= m;
            if channels == 1 {
                frame[0] = (l + r) * 0.5;
            } else {
                frame[0] = l;
                frame[1] = r;
                for s in frame.iter_mut().skip(2) {
                    *s = 0.0;
                }
            }
        }
        // Reap finished one-shots once per block.
        if let Some(buses) = &mut self.buses {
            buses.synth.retain(|v| !v.is_finished());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::{ToneSpec, ToneVoice};

    #[test]
    fn no_buses_renders_silence() {
        let mut g = MixerGraph::new(44100.0);
        g.set_master(1.0);
        let mut buf = vec![1.0f32; 512];
        g.render(&mut buf, 2);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn finished_voices_are_reaped() {
        let mut g = MixerGraph::new(44100.0);
        g.set_master(1.0);
        g.build_buses(None);
        g.add_voice(crate::voice::VoiceNode::Tone(ToneVoice::new(
            ToneSpec {
                attack: 0.001,
                decay: 0.002,
                ..Default::default()
            },
            44100.0,
        )));
        assert_eq!(g.synth_voice_count(), 1);
        // ~0.1 s, well past the envelope.
        let mut buf = vec![0.0f32; 8192];
        g.render(&mut buf, 2);
        assert_eq!(g.synth_voice_count(), 0);
    }

    #[test]
    fn teardown_clears_everything_but_master() {
        let mut g = MixerGraph::new(44100.0);
        g.set_master(0.42);
        g.build_buses(None);
        g.add_voice(crate::voice::VoiceNode::Tone(ToneVoice::new(
            ToneSpec::default(),
            44100.0,
        )));
        g.teardown_buses();
        assert_eq!(g.synth_voice_count(), 0);
        assert_eq!(g.loop_source_count(), 0);
        assert_eq!(g.master_value(), 0.42);
    }

    #[test]
    fn voice_after_teardown_is_dropped() {
        let mut g = MixerGraph::new(44100.0);
        g.build_buses(None);
        g.teardown_buses();
        g.add_voice(crate::voice::VoiceNode::Tone(ToneVoice::new(
            ToneSpec::default(),
            44100.0,
        )));
        assert_eq!(g.synth_voice_count(), 0);
    }

    #[test]
    fn master_fade_scales_output() {
        let mut g = MixerGraph::new(1000.0);
        g.build_buses(None);
        g.add_voice(crate::voice::VoiceNode::Tone(ToneVoice::new(
            ToneSpec {
                gain: 0.5,
                attack: 0.0,
                decay: 10.0,
                filter_freq: 20000.0,
                ..Default::default()
            },
            1000.0,
        )));
        // Master at zero: silent even with a live voice.
        let mut buf = vec![0.0f32; 200];
        g.render(&mut buf, 2);
        assert!(buf.iter().all(|&s| s == 0.0));
        g.fade_master_to(1.0, 0.05);
        let mut buf2 = vec![0.0f32; 2000];
        g.render(&mut buf2, 2);
        assert!(buf2.iter().any(|&s| s.abs() > 0.001));
    }
}
