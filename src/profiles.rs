//! Soundscape profiles.
//!
//! One builder, `build_from_params`, turns a [`MusicParams`] bag into the
//! standard layer stack: a pad carrying the chord, a filtered noise bed and
//! a low drone for atmosphere, three jittered melodic layers (melody an
//! octave up, bass an octave down and darker, a quieter counter line), and
//! the recurring events. The eight named profiles are presets over that
//! same builder; a couple add a hand-placed extra on top (the lullaby's
//! shimmer drones).

use crate::events::schedule_event;
use crate::filter::FilterKind;
use crate::osc::Waveform;
use crate::params::{EventSpec, MusicParams, PadType};
use crate::scheduler::SoundCtx;
use crate::voice::{
    DroneSpec, FmPadSpec, NoiseBedSpec, NoiseBurstSpec, PadSpec, ResonantPadSpec, ToneSpec,
};
use crate::noise::NoiseColor;
use rand::Rng;
use std::time::Duration;

pub const PROFILE_NAMES: [&str; 8] = [
    "dreamy-clouds",
    "forest-night",
    "moonlit-meadow",
    "cosmic-voyage",
    "enchanted-garden",
    "starlight-lullaby",
    "autumn-forest",
    "ocean-drift",
];

struct ProfileDef {
    name: &'static str,
    params: fn() -> MusicParams,
    extra: Option<fn(&mut SoundCtx)>,
}

fn definitions() -> [ProfileDef; 8] {
    [
        ProfileDef {
            name: "dreamy-clouds",
            params: dreamy_clouds,
            extra: None,
        },
        ProfileDef {
            name: "forest-night",
            params: forest_night,
            extra: None,
        },
        ProfileDef {
            name: "moonlit-meadow",
            params: moonlit_meadow,
            extra: None,
        },
        ProfileDef {
            name: "cosmic-voyage",
            params: cosmic_voyage,
            extra: None,
        },
        ProfileDef {
            name: "enchanted-garden",
            params: enchanted_garden,
            extra: None,
        },
        ProfileDef {
            name: "starlight-lullaby",
            params: starlight_lullaby,
            extra: Some(shimmer_layer),
        },
        ProfileDef {
            name: "autumn-forest",
            params: autumn_forest,
            extra: None,
        },
        ProfileDef {
            name: "ocean-drift",
            params: ocean_drift,
            extra: None,
        },
    ]
}

/// Build a named profile into the context. Returns false for names this
/// engine does not know.
pub(crate) fn build_profile(cx: &mut SoundCtx, name: &str) -> bool {
    for def in definitions() {
        if def.name == name {
            let params = (def.params)();
            build_from_params(cx, &params);
            if let Some(extra) = def.extra {
                extra(cx);
            }
            return true;
        }
    }
    false
}

/// The parameter bag for a named profile, if it exists. Also what the CLI
/// prints for `list`.
pub fn profile_params(name: &str) -> Option<MusicParams> {
    definitions()
        .iter()
        .find(|d| d.name == name)
        .map(|d| (d.params)())
}

fn event(kind: &str, interval: u64) -> EventSpec {
    EventSpec {
        kind: kind.to_string(),
        interval,
        gain: 1.0,
    }
}

fn event_gain(kind: &str, interval: u64, gain: f32) -> EventSpec {
    EventSpec {
        kind: kind.to_string(),
        interval,
        gain,
    }
}

// -- named presets ----------------------------------------------------------

/// FM bells over a C-major chord, a slow lullaby line on top. The chord
/// root doubles as the FM carrier.
fn dreamy_clouds() -> MusicParams {
    MusicParams {
        pad_type: PadType::Fm,
        chord_notes: vec![130.81, 164.81, 196.0, 261.63],
        pad_gain: 0.05,
        pad_filter: 900.0,
        pad_lfo: 0.06,
        noise_type: NoiseColor::Pink,
        noise_gain: 0.012,
        melody_notes: Some(vec![
            523.25, 523.25, 783.99, 783.99, 880.0, 880.0, 783.99, 698.46, 698.46, 659.25,
            659.25, 587.33, 587.33, 523.25,
        ]),
        melody_interval: 3_000,
        melody_gain: 0.02,
        bass_notes: Some(vec![65.41, 98.0, 110.0, 87.31]),
        bass_interval: 6_000,
        counter_notes: Some(vec![329.63, 293.66, 261.63, 246.94, 220.0, 196.0]),
        counter_interval: 4_500,
        events: vec![
            event("heartbeat", 4_000),
            event_gain("chimes", 5_000, 0.7),
            event("sparkle", 15_000),
        ],
        ..Default::default()
    }
}

/// Brown noise ringing through an E-minor resonant pad, pentatonic flute
/// line, the nocturnal animals on timers.
fn forest_night() -> MusicParams {
    MusicParams {
        pad_type: PadType::Resonant,
        chord_notes: vec![82.41, 123.47, 164.81, 196.0],
        pad_gain: 0.04,
        noise_type: NoiseColor::Brown,
        noise_gain: 0.012,
        melody_notes: Some(vec![329.63, 392.0, 440.0, 493.88, 587.33, 659.25]),
        melody_interval: 6_500,
        melody_gain: 0.013,
        events: vec![
            event("cricket", 7_000),
            event("owl", 18_000),
            event("frog", 10_000),
            event_gain("leaves", 9_000, 0.8),
        ],
        ..Default::default()
    }
}

/// Lush chorus pad on Fmaj7 with a bell arpeggio and a two-note cello
/// bass alternating F2 and C2.
fn moonlit_meadow() -> MusicParams {
    MusicParams {
        pad_type: PadType::Chorus,
        chord_notes: vec![87.31, 110.0, 130.81, 164.81],
        pad_gain: 0.05,
        pad_filter: 950.0,
        pad_lfo: 0.08,
        melody_notes: Some(vec![349.23, 440.0, 523.25, 659.25, 523.25, 440.0]),
        melody_interval: 3_200,
        melody_gain: 0.02,
        bass_notes: Some(vec![87.31, 65.41]),
        bass_interval: 6_400,
        counter_notes: Some(vec![174.61, 220.0, 261.63, 329.63, 261.63, 220.0]),
        counter_interval: 3_200,
        events: vec![
            event("waterDrop", 4_000),
            event("birdChirp", 12_000),
            event_gain("sparkle", 4_000, 0.6),
        ],
        ..Default::default()
    }
}

/// Metallic FM on D minor with a deep-space drone and sonar pings.
fn cosmic_voyage() -> MusicParams {
    MusicParams {
        pad_type: PadType::Fm,
        chord_notes: vec![146.83, 174.61, 220.0],
        pad_gain: 0.048,
        pad_filter: 550.0,
        pad_lfo: 0.04,
        noise_type: NoiseColor::White,
        noise_gain: 0.004,
        drone_freq: Some(36.71),
        melody_notes: Some(vec![587.33, 523.25, 466.16, 440.0, 466.16, 523.25]),
        melody_interval: 7_000,
        melody_gain: 0.015,
        bass_interval: 9_000,
        counter_notes: Some(vec![146.83, 174.61, 220.0]),
        counter_interval: 8_000,
        events: vec![
            event("radarPing", 10_000),
            event("starTwinkle", 7_000),
            event_gain("sparkle", 13_000, 0.6),
        ],
        ..Default::default()
    }
}

/// G-major kalimba plucks over a light breeze, birdsong in the gaps.
fn enchanted_garden() -> MusicParams {
    MusicParams {
        pad_type: PadType::Plucked,
        chord_notes: vec![98.0, 123.47, 146.83, 196.0],
        pad_gain: 0.022,
        noise_gain: 0.007,
        melody_notes: Some(vec![
            392.0, 493.88, 587.33, 783.99, 587.33, 493.88, 392.0, 329.63,
        ]),
        melody_interval: 2_800,
        melody_gain: 0.016,
        bass_notes: Some(vec![98.0, 73.42, 82.41, 65.41]),
        bass_interval: 5_600,
        counter_interval: 5_600,
        events: vec![
            event("birdChirp", 8_000),
            event("waterDrop", 12_000),
            event("sparkle", 10_000),
            event_gain("chimes", 20_000, 0.8),
        ],
        ..Default::default()
    }
}

/// Tight music-box chorus on A-flat major, a sixteen-note box melody and
/// a rocking two-note bass.
fn starlight_lullaby() -> MusicParams {
    MusicParams {
        pad_type: PadType::Chorus,
        chord_notes: vec![103.83, 130.81, 155.56, 207.65],
        pad_gain: 0.038,
        pad_filter: 1_050.0,
        pad_lfo: 0.06,
        noise_gain: 0.004,
        melody_notes: Some(vec![
            830.61, 622.25, 523.25, 415.3, 523.25, 622.25, 830.61, 1046.5, 830.61, 622.25,
            415.3, 311.13, 415.3, 523.25, 622.25, 830.61,
        ]),
        melody_interval: 2_200,
        melody_gain: 0.015,
        bass_notes: Some(vec![103.83, 77.78]),
        bass_interval: 4_400,
        counter_notes: Some(vec![207.65, 261.63, 311.13]),
        counter_interval: 4_400,
        events: vec![
            event("starTwinkle", 5_000),
            event_gain("chimes", 16_000, 0.6),
        ],
        ..Default::default()
    }
}

/// Warm pink-noise resonance on D major, low Q, woody and dry.
fn autumn_forest() -> MusicParams {
    MusicParams {
        pad_type: PadType::Resonant,
        chord_notes: vec![73.42, 110.0, 146.83, 220.0],
        pad_gain: 0.02,
        pad_lfo: 0.035,
        drone_freq: Some(73.42),
        drone_gain: 0.012,
        melody_notes: Some(vec![146.83, 174.61, 220.0, 246.94, 293.66]),
        melody_interval: 6_500,
        melody_gain: 0.015,
        bass_notes: Some(vec![73.42, 110.0, 98.0]),
        bass_interval: 6_500,
        events: vec![
            event("windGust", 8_000),
            event("leaves", 10_000),
            event_gain("owl", 12_000, 0.7),
        ],
        ..Default::default()
    }
}

/// Wide choir-like chorus on E-flat major, ship bells and whale song.
fn ocean_drift() -> MusicParams {
    MusicParams {
        pad_type: PadType::Chorus,
        chord_notes: vec![77.78, 98.0, 116.54, 155.56],
        pad_gain: 0.048,
        pad_filter: 750.0,
        pad_lfo: 0.055,
        noise_gain: 0.016,
        drone_freq: Some(38.89),
        drone_gain: 0.03,
        melody_notes: Some(vec![622.25, 587.33, 466.16, 311.13, 466.16, 587.33]),
        melody_interval: 5_500,
        melody_gain: 0.017,
        bass_notes: Some(vec![77.78, 58.27, 51.96]),
        bass_interval: 7_000,
        events: vec![
            event("waveCycle", 11_000),
            event("whaleCall", 20_000),
            event_gain("sparkle", 16_000, 0.5),
        ],
        ..Default::default()
    }
}

/// Two very quiet high sines whose level breathes out of phase. Sits on
/// top of the lullaby preset.
fn shimmer_layer(cx: &mut SoundCtx) {
    for (i, freq) in [880.0f32, 1318.5].into_iter().enumerate() {
        cx.drone(
            freq,
            &DroneSpec {
                gain: 0.004,
                filter_freq: 8_000.0,
                pitch_lfo: (0.03, 0.8),
                amp_lfo: Some((0.15 + i as f32 * 0.08, 0.003)),
                ..Default::default()
            },
        );
    }
}

// -- the builder ------------------------------------------------------------

pub(crate) fn build_from_params(cx: &mut SoundCtx, p: &MusicParams) {
    build_pad(cx, p);

    if p.noise_gain > 0.0 {
        cx.noise_bed(&NoiseBedSpec {
            color: p.noise_type,
            gain: p.noise_gain,
            filter_freq: p.pad_filter * 0.6,
            ..Default::default()
        });
    }

    if p.drone_gain > 0.0 {
        cx.drone(
            p.drone_freq(),
            &DroneSpec {
                gain: p.drone_gain,
                ..Default::default()
            },
        );
    }

    melodic_layer(
        cx,
        p.melody_notes(),
        p.melody_interval,
        p.melody_gain,
        MelodicRole::Melody,
        p.pad_filter,
    );
    melodic_layer(
        cx,
        p.bass_notes(),
        p.bass_interval,
        p.melody_gain,
        MelodicRole::Bass,
        p.pad_filter,
    );
    melodic_layer(
        cx,
        p.counter_notes(),
        p.counter_interval,
        p.melody_gain,
        MelodicRole::Counter,
        p.pad_filter,
    );

    for e in &p.events {
        schedule_event(cx, e);
    }
}

fn build_pad(cx: &mut SoundCtx, p: &MusicParams) {
    match p.pad_type {
        PadType::Chorus => cx.chorus_pad(
            &p.chord_notes,
            &PadSpec {
                gain: p.pad_gain,
                filter_freq: p.pad_filter,
                lfo_rate: p.pad_lfo,
                ..Default::default()
            },
        ),
        PadType::Simple => cx.simple_pad(
            &p.chord_notes,
            &PadSpec {
                gain: p.pad_gain,
                filter_freq: p.pad_filter,
                lfo_rate: p.pad_lfo,
                ..Default::default()
            },
        ),
        PadType::Fm => cx.fm_pad(
            &p.chord_notes,
            &FmPadSpec {
                gain: p.pad_gain,
                filter_freq: p.pad_filter,
                lfo_rate: p.pad_lfo,
                ..Default::default()
            },
        ),
        PadType::Resonant => cx.resonant_pad(
            &p.chord_notes,
            &ResonantPadSpec {
                gain: p.pad_gain,
                lfo_rate: p.pad_lfo,
                ..Default::default()
            },
        ),
        PadType::Plucked => {
            // Kalimba: a short white-noise burst rung through a high-Q
            // bandpass tuned to the note. No sustained pad; the chord
            // arrives an octave up as a slow arpeggio, cycling the
            // notes in order, first pluck immediate.
            let notes: Vec<f32> = p.chord_notes.iter().map(|f| f * 2.0).collect();
            let gain = p.pad_gain;
            let mut idx = 0usize;
            cx.every_after(
                Duration::from_millis(2_000),
                0.2,
                Duration::ZERO,
                move |cx| {
                    if notes.is_empty() {
                        return;
                    }
                    let freq = notes[idx % notes.len()];
                    idx += 1;
                    cx.noise_burst(NoiseBurstSpec {
                        color: NoiseColor::White,
                        duration: 1.2,
                        filter_kind: FilterKind::Bandpass,
                        filter_freq: freq,
                        filter_q: 20.0,
                        shaped: false,
                        gain_path: Some(vec![(0.0, gain), (0.08, gain * 0.5), (1.2, 0.0)]),
                        ..Default::default()
                    });
                },
            );
        }
    }
}

enum MelodicRole {
    Melody,
    Bass,
    Counter,
}

impl MelodicRole {
    /// Level relative to the configured melody gain. The bass sits a
    /// touch under the melody, the counter line well under both.
    fn gain_scale(&self) -> f32 {
        match self {
            MelodicRole::Melody => 1.0,
            MelodicRole::Bass => 0.8,
            MelodicRole::Counter => 0.6,
        }
    }
}

fn melodic_layer(
    cx: &mut SoundCtx,
    notes: Vec<f32>,
    interval_ms: u64,
    melody_gain: f32,
    role: MelodicRole,
    pad_filter: f32,
) {
    let gain = melody_gain * role.gain_scale();
    if notes.is_empty() || gain <= 0.0 {
        return;
    }
    let (waveform, attack, decay, filter, jitter) = match role {
        MelodicRole::Melody => (Waveform::Sine, 0.1, 2.5, pad_filter * 1.5, 0.15),
        // The bass walks slowly under its own dark fixed cutoff.
        MelodicRole::Bass => (Waveform::Triangle, 0.2, 5.5, 250.0, 0.2),
        MelodicRole::Counter => (Waveform::Sine, 0.15, 3.2, pad_filter * 1.2, 0.2),
    };
    let pan_spread = match role {
        MelodicRole::Bass => 0.1,
        _ => 0.4,
    };
    // Notes play in written order, one per firing, wrapping at the end,
    // so a written phrase stays a phrase.
    let mut idx = 0usize;
    cx.every(Duration::from_millis(interval_ms.max(250)), jitter, move |cx| {
        let freq = notes[idx % notes.len()];
        idx += 1;
        let pan = cx.rng.gen_range(-pan_spread..=pan_spread);
        let detune = cx.rng.gen_range(-3.0..3.0);
        cx.tone(ToneSpec {
            freq,
            waveform,
            gain,
            attack,
            decay,
            filter_freq: filter,
            filter_q: 0.6,
            detune,
            pan,
            ..Default::default()
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::MixerGraph;
    use crate::scheduler::Scheduler;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    /// Fundamental of the current graph output, from positive-going zero
    /// crossings over half a second of mono render.
    fn dominant_freq(graph: &mut MixerGraph) -> f32 {
        let mut buf = vec![0.0f32; 22_050];
        graph.render(&mut buf, 1);
        let mut crossings = 0u32;
        for w in buf.windows(2) {
            if w[0] <= 0.0 && w[1] > 0.0 {
                crossings += 1;
            }
        }
        crossings as f32 / 0.5
    }

    fn build(name: &str) -> (MixerGraph, usize) {
        let mut graph = MixerGraph::new(44100.0);
        graph.build_buses(None);
        let mut rng = SmallRng::seed_from_u64(42);
        let mut cx = SoundCtx::new(&mut graph, &mut rng, Duration::ZERO, 1);
        assert!(build_profile(&mut cx, name), "profile {name} missing");
        let jobs = cx.into_jobs().len();
        (graph, jobs)
    }

    #[test]
    fn every_profile_builds_layers() {
        for name in PROFILE_NAMES {
            let (graph, jobs) = build(name);
            assert!(
                graph.synth_voice_count() >= 2,
                "{name}: too few voices ({})",
                graph.synth_voice_count()
            );
            // Three melodic layers plus at least two events everywhere.
            assert!(jobs >= 5, "{name}: too few jobs ({jobs})");
        }
    }

    #[test]
    fn unknown_profile_is_rejected() {
        let mut graph = MixerGraph::new(44100.0);
        graph.build_buses(None);
        let mut rng = SmallRng::seed_from_u64(1);
        let mut cx = SoundCtx::new(&mut graph, &mut rng, Duration::ZERO, 1);
        assert!(!build_profile(&mut cx, "lava-fields"));
        assert_eq!(graph.synth_voice_count(), 0);
    }

    #[test]
    fn minimal_params_build_full_stack() {
        let mut graph = MixerGraph::new(44100.0);
        graph.build_buses(None);
        let mut rng = SmallRng::seed_from_u64(2);
        let mut cx = SoundCtx::new(&mut graph, &mut rng, Duration::ZERO, 1);
        let p = MusicParams {
            chord_notes: vec![220.0, 277.0, 329.0],
            ..Default::default()
        };
        build_from_params(&mut cx, &p);
        let jobs = cx.into_jobs().len();
        // Pad, noise bed, drone.
        assert_eq!(graph.synth_voice_count(), 3);
        // Melody, bass, counter.
        assert_eq!(jobs, 3);
    }

    #[test]
    fn plucked_pad_is_scheduled_not_sustained() {
        let mut graph = MixerGraph::new(44100.0);
        graph.build_buses(None);
        let mut rng = SmallRng::seed_from_u64(3);
        let mut cx = SoundCtx::new(&mut graph, &mut rng, Duration::ZERO, 1);
        let p = MusicParams {
            pad_type: PadType::Plucked,
            chord_notes: vec![261.63, 329.63, 392.0],
            ..Default::default()
        };
        build_from_params(&mut cx, &p);
        let jobs = cx.into_jobs().len();
        // Noise bed and drone only; the pad became a repeating job.
        assert_eq!(graph.synth_voice_count(), 2);
        assert_eq!(jobs, 4);
    }

    #[test]
    fn melody_notes_play_in_written_order() {
        let mut graph = MixerGraph::new(44100.0);
        graph.set_master(1.0);
        graph.build_buses(None);
        let mut rng = SmallRng::seed_from_u64(11);
        let mut cx = SoundCtx::new(&mut graph, &mut rng, Duration::ZERO, 1);
        // Octave-spaced notes so zero-crossing counting can tell them apart.
        melodic_layer(
            &mut cx,
            vec![110.0, 220.0, 440.0],
            1_000,
            0.02,
            MelodicRole::Melody,
            800.0,
        );
        let mut sched = Scheduler::new();
        sched.absorb(cx.into_jobs());

        let mut heard = Vec::new();
        let mut t = Duration::ZERO;
        while heard.len() < 6 && t < Duration::from_secs(30) {
            t += Duration::from_millis(100);
            sched.tick(t, 1, &mut graph, &mut rng);
            if graph.synth_voice_count() > 0 {
                heard.push(dominant_freq(&mut graph));
                // Clear the ringing tail before the next firing.
                graph.build_buses(None);
            }
        }
        assert_eq!(heard.len(), 6, "melody stalled");
        for (i, f) in heard.iter().enumerate() {
            let expect = [110.0f32, 220.0, 440.0][i % 3];
            assert!(
                (f / expect - 1.0).abs() < 0.25,
                "note {i}: heard {f} Hz, wanted {expect} Hz"
            );
        }
    }

    #[test]
    fn layer_gain_scales_follow_roles() {
        assert_eq!(MelodicRole::Melody.gain_scale(), 1.0);
        assert_eq!(MelodicRole::Bass.gain_scale(), 0.8);
        assert_eq!(MelodicRole::Counter.gain_scale(), 0.6);
    }

    #[test]
    fn pluck_is_a_short_ringing_burst() {
        let mut graph = MixerGraph::new(44100.0);
        graph.set_master(1.0);
        graph.build_buses(None);
        let mut rng = SmallRng::seed_from_u64(5);
        let mut cx = SoundCtx::new(&mut graph, &mut rng, Duration::ZERO, 1);
        let p = MusicParams {
            pad_type: PadType::Plucked,
            chord_notes: vec![98.0, 123.47],
            noise_gain: 0.0,
            drone_gain: 0.0,
            melody_gain: 0.0,
            ..Default::default()
        };
        build_from_params(&mut cx, &p);
        let mut sched = Scheduler::new();
        sched.absorb(cx.into_jobs());

        // First pluck lands immediately.
        sched.tick(Duration::ZERO, 1, &mut graph, &mut rng);
        assert_eq!(graph.synth_voice_count(), 1);
        // Audible while ringing...
        let mut buf = vec![0.0f32; 4_410];
        graph.render(&mut buf, 1);
        assert!(buf.iter().any(|&s| s.abs() > 1e-5));
        // ...and reaped once the burst envelope runs out.
        let mut rest = vec![0.0f32; 60_000];
        graph.render(&mut rest, 1);
        assert_eq!(graph.synth_voice_count(), 0);
    }

    #[test]
    fn zeroed_gains_skip_layers() {
        let mut graph = MixerGraph::new(44100.0);
        graph.build_buses(None);
        let mut rng = SmallRng::seed_from_u64(4);
        let mut cx = SoundCtx::new(&mut graph, &mut rng, Duration::ZERO, 1);
        let p = MusicParams {
            chord_notes: vec![220.0],
            noise_gain: 0.0,
            drone_gain: 0.0,
            melody_gain: 0.0,
            ..Default::default()
        };
        build_from_params(&mut cx, &p);
        let jobs = cx.into_jobs().len();
        assert_eq!(graph.synth_voice_count(), 1);
        assert_eq!(jobs, 0);
    }

    #[test]
    fn profile_params_lookup() {
        assert!(profile_params("ocean-drift").is_some());
        assert!(profile_params("nope").is_none());
    }
}
