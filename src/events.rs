//! Recurring atmospheric events.
//!
//! Each event kind is a small recipe: when its timer fires it drops a few
//! one-shot voices on the synth bus, randomized in pitch, timing and pan
//! so no two firings are identical. Multi-part events (cricket chirp
//! trains, the owl's second hoot, radar echoes) chain through
//! `SoundCtx::after`, so every part carries the play cycle's generation
//! and dies with it.
//!
//! Kinds are strings because they arrive from JSON written by story
//! authors; an unknown kind logs a warning and is skipped, never an error.

use crate::filter::FilterKind;
use crate::noise::NoiseColor;
use crate::osc::Waveform;
use crate::params::EventSpec;
use crate::scheduler::SoundCtx;
use crate::voice::{NoiseBurstSpec, ToneSpec};
use rand::Rng;
use std::time::Duration;
use tracing::warn;

pub const EVENT_KINDS: [&str; 14] = [
    "sparkle",
    "windGust",
    "cricket",
    "frog",
    "owl",
    "waterDrop",
    "waveCycle",
    "starTwinkle",
    "birdChirp",
    "whaleCall",
    "heartbeat",
    "chimes",
    "leaves",
    "radarPing",
];

/// Register the repeating timer for one event. Returns false (after a
/// warning) for kinds this engine does not know.
pub(crate) fn schedule_event(cx: &mut SoundCtx, spec: &EventSpec) -> bool {
    let g = spec.gain;
    let interval = Duration::from_millis(spec.interval.max(250));
    let fire: Box<dyn FnMut(&mut SoundCtx) + Send> = match spec.kind.as_str() {
        "sparkle" => Box::new(move |cx| sparkle(cx, g)),
        "windGust" => Box::new(move |cx| wind_gust(cx, g)),
        "cricket" => Box::new(move |cx| cricket(cx, g)),
        "frog" => Box::new(move |cx| frog(cx, g)),
        "owl" => Box::new(move |cx| owl(cx, g)),
        "waterDrop" => Box::new(move |cx| water_drop(cx, g)),
        "waveCycle" => Box::new(move |cx| wave_cycle(cx, g)),
        "starTwinkle" => Box::new(move |cx| star_twinkle(cx, g)),
        "birdChirp" => Box::new(move |cx| bird_chirp(cx, g)),
        "whaleCall" => Box::new(move |cx| whale_call(cx, g)),
        "heartbeat" => Box::new(move |cx| heartbeat(cx, g)),
        "chimes" => Box::new(move |cx| chimes(cx, g)),
        "leaves" => Box::new(move |cx| leaves(cx, g)),
        "radarPing" => Box::new(move |cx| radar_ping(cx, g)),
        other => {
            warn!(kind = other, "unknown event type, skipping");
            return false;
        }
    };
    cx.every(interval, 0.3, fire);
    true
}

fn sparkle(cx: &mut SoundCtx, g: f32) {
    let freq = cx.rng.gen_range(1200.0..2400.0);
    let pan = cx.rng.gen_range(-0.7..0.7);
    let decay = cx.rng.gen_range(0.8..1.5);
    cx.tone(ToneSpec {
        freq,
        gain: 0.006 * g,
        attack: 0.005,
        decay,
        filter_freq: 6000.0,
        pan,
        ..Default::default()
    });
}

fn star_twinkle(cx: &mut SoundCtx, g: f32) {
    let freq = cx.rng.gen_range(2000.0..3500.0);
    let pan = cx.rng.gen_range(-0.8..0.8);
    let decay = cx.rng.gen_range(1.0..2.0);
    cx.tone(ToneSpec {
        freq,
        waveform: Waveform::Triangle,
        gain: 0.004 * g,
        attack: 0.01,
        decay,
        filter_freq: 8000.0,
        pan,
        ..Default::default()
    });
}

fn wind_gust(cx: &mut SoundCtx, g: f32) {
    let dur = cx.rng.gen_range(2.0..4.0);
    let pan = cx.rng.gen_range(-0.4..0.4);
    cx.noise_burst(NoiseBurstSpec {
        color: NoiseColor::Pink,
        duration: dur,
        gain: 0.008 * g,
        filter_kind: FilterKind::Lowpass,
        filter_q: 0.8,
        filter_sweep: Some(vec![(0.0, 200.0), (dur * 0.5, 600.0), (dur, 250.0)]),
        pan,
        ..Default::default()
    });
}

fn cricket(cx: &mut SoundCtx, g: f32) {
    let chirps = cx.rng.gen_range(3..=5);
    let freq = cx.rng.gen_range(4000.0..4600.0);
    let pan = cx.rng.gen_range(-0.6..0.6);
    for i in 0..chirps {
        let delay = Duration::from_millis(i * 70);
        cx.after(delay, move |cx| {
            cx.tone(ToneSpec {
                freq,
                gain: 0.004 * g,
                attack: 0.005,
                decay: 0.03,
                filter_freq: 7000.0,
                pan,
                ..Default::default()
            });
        });
    }
}

fn frog(cx: &mut SoundCtx, g: f32) {
    let base = cx.rng.gen_range(80.0..110.0);
    let pan = cx.rng.gen_range(-0.5..0.5);
    let croak = move |cx: &mut SoundCtx| {
        cx.tone(ToneSpec {
            freq: base,
            waveform: Waveform::Square,
            gain: 0.005 * g,
            attack: 0.02,
            decay: 0.18,
            filter_freq: 400.0,
            filter_q: 2.0,
            pitch_path: Some(vec![(0.0, base * 1.3), (0.2, base)]),
            pan,
            ..Default::default()
        });
    };
    croak(cx);
    cx.after(Duration::from_millis(260), croak);
}

fn owl(cx: &mut SoundCtx, g: f32) {
    let base = cx.rng.gen_range(310.0..350.0);
    let pan = cx.rng.gen_range(-0.6..0.6);
    cx.tone(ToneSpec {
        freq: base,
        gain: 0.008 * g,
        attack: 0.04,
        decay: 0.4,
        filter_freq: 900.0,
        pitch_path: Some(vec![(0.0, base), (0.35, base * 0.88)]),
        pan,
        ..Default::default()
    });
    // Second, longer hoot with a slight waver.
    cx.after(Duration::from_millis(450), move |cx| {
        cx.tone(ToneSpec {
            freq: base * 0.94,
            gain: 0.008 * g,
            attack: 0.05,
            decay: 0.9,
            filter_freq: 900.0,
            vibrato: Some((5.5, 4.0)),
            pan,
            ..Default::default()
        });
    });
}

fn water_drop(cx: &mut SoundCtx, g: f32) {
    let top = cx.rng.gen_range(700.0..1100.0);
    let pan = cx.rng.gen_range(-0.5..0.5);
    cx.tone(ToneSpec {
        freq: top,
        gain: 0.007 * g,
        attack: 0.002,
        decay: 0.3,
        filter_freq: 3000.0,
        pitch_path: Some(vec![(0.0, top), (0.15, top * 0.35)]),
        pan,
        ..Default::default()
    });
    // The tiny ring after the plink.
    cx.after(Duration::from_millis(90), move |cx| {
        cx.tone(ToneSpec {
            freq: top * 2.0,
            gain: 0.002 * g,
            attack: 0.005,
            decay: 0.5,
            filter_freq: 6000.0,
            pan,
            ..Default::default()
        });
    });
}

fn wave_cycle(cx: &mut SoundCtx, g: f32) {
    let dur = cx.rng.gen_range(6.0..9.0);
    let pan = cx.rng.gen_range(-0.3..0.3);
    cx.noise_burst(NoiseBurstSpec {
        color: NoiseColor::Pink,
        duration: dur,
        shaped: false,
        filter_kind: FilterKind::Lowpass,
        filter_q: 0.7,
        gain_path: Some(vec![
            (0.0, 0.0),
            (dur * 0.4, 0.02 * g),
            (dur * 0.5, 0.025 * g),
            (dur, 0.001 * g),
        ]),
        filter_sweep: Some(vec![(0.0, 200.0), (dur * 0.5, 800.0), (dur, 300.0)]),
        pan,
        ..Default::default()
    });
}

fn bird_chirp(cx: &mut SoundCtx, g: f32) {
    let chirps = cx.rng.gen_range(2..=4);
    let pan = cx.rng.gen_range(-0.7..0.7);
    for i in 0..chirps {
        let delay = Duration::from_millis(i * 110);
        cx.after(delay, move |cx| {
            let lo = cx.rng.gen_range(1600.0..2000.0);
            cx.tone(ToneSpec {
                freq: lo,
                gain: 0.005 * g,
                attack: 0.005,
                decay: 0.12,
                filter_freq: 6000.0,
                pitch_path: Some(vec![(0.0, lo), (0.08, lo * 1.45)]),
                pan,
                ..Default::default()
            });
        });
    }
}

fn whale_call(cx: &mut SoundCtx, g: f32) {
    let base = cx.rng.gen_range(120.0..180.0);
    let pan = cx.rng.gen_range(-0.4..0.4);
    cx.tone(ToneSpec {
        freq: base,
        gain: 0.01 * g,
        attack: 0.5,
        decay: 4.5,
        filter_freq: 400.0,
        filter_q: 3.0,
        pitch_path: Some(vec![
            (0.0, base),
            (1.5, base * 2.5),
            (3.0, base * 1.2),
            (4.5, base * 0.8),
        ]),
        pan,
        ..Default::default()
    });
}

fn heartbeat(cx: &mut SoundCtx, g: f32) {
    let thump = move |cx: &mut SoundCtx, gain: f32| {
        cx.tone(ToneSpec {
            freq: 55.0,
            gain,
            attack: 0.01,
            decay: 0.12,
            filter_freq: 120.0,
            ..Default::default()
        });
    };
    thump(cx, 0.02 * g);
    cx.after(Duration::from_millis(350), move |cx| thump(cx, 0.014 * g));
}

fn chimes(cx: &mut SoundCtx, g: f32) {
    let scale = [523.25, 659.25, 783.99, 1046.5, 1318.5];
    let count = cx.rng.gen_range(2..=4);
    let mut delay = Duration::ZERO;
    for _ in 0..count {
        let freq = scale[cx.rng.gen_range(0..scale.len())];
        let pan = cx.rng.gen_range(-0.5..0.5);
        cx.after(delay, move |cx| {
            let decay = cx.rng.gen_range(2.0..3.0);
            cx.tone(ToneSpec {
                freq,
                waveform: Waveform::Triangle,
                gain: 0.005 * g,
                attack: 0.005,
                decay,
                filter_freq: 5000.0,
                pan,
                ..Default::default()
            });
        });
        delay += Duration::from_millis(cx.rng.gen_range(150..400));
    }
}

fn leaves(cx: &mut SoundCtx, g: f32) {
    let duration = cx.rng.gen_range(0.4..0.8);
    let pan = cx.rng.gen_range(-0.7..0.7);
    cx.noise_burst(NoiseBurstSpec {
        color: NoiseColor::White,
        duration,
        gain: 0.003 * g,
        filter_freq: 5000.0,
        filter_q: 1.5,
        filter_kind: FilterKind::Bandpass,
        pan,
        ..Default::default()
    });
}

fn radar_ping(cx: &mut SoundCtx, g: f32) {
    let pan = cx.rng.gen_range(-0.3..0.3);
    cx.tone(ToneSpec {
        freq: 1200.0,
        gain: 0.006 * g,
        attack: 0.002,
        decay: 1.2,
        filter_freq: 1200.0,
        filter_q: 8.0,
        filter_kind: FilterKind::Bandpass,
        pan,
        ..Default::default()
    });
    // Faint echo.
    cx.after(Duration::from_millis(300), move |cx| {
        cx.tone(ToneSpec {
            freq: 1200.0,
            gain: 0.0025 * g,
            attack: 0.002,
            decay: 1.0,
            filter_freq: 1200.0,
            filter_q: 8.0,
            filter_kind: FilterKind::Bandpass,
            pan,
            ..Default::default()
        });
    });
}
