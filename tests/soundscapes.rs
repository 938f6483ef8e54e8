//! Soundscape content tests: parameter bags, audio output, loop beds.

use nocturne::{
    AmbientEngine, EngineConfig, EventSpec, ManualClock, MusicParams, OfflineBackend,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const SR: f32 = 44100.0;

fn engine_with_root(root: &Path) -> (AmbientEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let config = EngineConfig {
        seed: Some(7),
        audio_root: root.to_path_buf(),
        ..Default::default()
    };
    let e = AmbientEngine::new(Box::new(OfflineBackend::new(SR)), clock.clone(), config);
    (e, clock)
}

fn engine() -> (AmbientEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let config = EngineConfig {
        seed: Some(7),
        ..Default::default()
    };
    let e = AmbientEngine::new(Box::new(OfflineBackend::new(SR)), clock.clone(), config);
    (e, clock)
}

/// Advance clock and graph together, collecting the rendered audio.
fn render_secs(e: &AmbientEngine, clock: &ManualClock, secs: f32) -> Vec<f32> {
    let graph = e.graph();
    let step_frames = (SR * 0.05) as usize;
    let mut buf = vec![0.0f32; step_frames * 2];
    let mut out = Vec::new();
    let steps = (secs / 0.05).ceil() as usize;
    for _ in 0..steps {
        clock.advance(Duration::from_millis(50));
        e.tick();
        graph.lock().unwrap().render(&mut buf, 2);
        out.extend_from_slice(&buf);
    }
    out
}

fn rms(samples: &[f32]) -> f32 {
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

#[test]
fn minimal_params_make_a_full_soundscape() {
    let (e, clock) = engine();
    e.play(MusicParams {
        chord_notes: vec![220.0, 277.0, 329.0],
        ..Default::default()
    });
    assert_eq!(e.current_profile().as_deref(), Some("custom-params"));
    // Pad, noise bed, drone; melody, bass, counter timers.
    assert_eq!(e.synth_voice_count(), 3);
    assert_eq!(e.scheduled_job_count(), 3);

    // Every melodic layer's first firing lands within its base interval
    // (bass is the slowest at 6 s), so by 7 s one-shots have appeared.
    let graph = e.graph();
    let mut buf = vec![0.0f32; (SR * 0.05) as usize * 2];
    let mut audio = Vec::new();
    let mut peak_voices = 0;
    for _ in 0..140 {
        clock.advance(Duration::from_millis(50));
        e.tick();
        graph.lock().unwrap().render(&mut buf, 2);
        audio.extend_from_slice(&buf);
        peak_voices = peak_voices.max(e.synth_voice_count());
    }
    assert!(peak_voices > 3, "no melodic one-shots spawned");
    assert!(rms(&audio) > 1e-4, "soundscape is silent");
}

#[test]
fn unknown_event_kind_is_skipped_not_fatal() {
    let (e, _clock) = engine();
    e.play(MusicParams {
        chord_notes: vec![220.0, 277.0, 329.0],
        events: vec![
            EventSpec {
                kind: "kraken".to_string(),
                ..Default::default()
            },
            EventSpec {
                kind: "owl".to_string(),
                ..Default::default()
            },
        ],
        ..Default::default()
    });
    assert!(e.is_playing());
    // Three melodic timers plus the owl; the kraken vanished.
    assert_eq!(e.scheduled_job_count(), 4);
}

#[test]
fn playback_fades_in_from_silence() {
    let (e, clock) = engine();
    e.play("starlight-lullaby");
    let audio = render_secs(&e, &clock, 6.0);
    let frames = audio.len() / 2;
    // First 100 ms sit at the very start of the 3 s master ramp.
    let head = &audio[..(SR * 0.1) as usize * 2];
    let settled = &audio[(frames - (SR as usize)) * 2..];
    assert!(rms(settled) > 1e-4, "never became audible");
    assert!(rms(head) < rms(settled) * 0.2, "no fade-in");
}

#[test]
fn seeded_renders_are_reproducible() {
    let run = || {
        let (e, clock) = engine();
        e.play("cosmic-voyage");
        render_secs(&e, &clock, 3.0)
    };
    let a = run();
    let b = run();
    assert_eq!(a.len(), b.len());
    assert!(a.iter().zip(&b).all(|(x, y)| x == y), "renders diverged");
}

#[test]
fn json_params_play_end_to_end() {
    let params: MusicParams = serde_json::from_str(
        r#"{
            "padType": "fm",
            "chordNotes": [196, 246.94, 293.66],
            "melodyInterval": 2000,
            "events": [{"type": "waterDrop", "interval": 4000}]
        }"#,
    )
    .unwrap();
    let (e, clock) = engine();
    e.play(params);
    let audio = render_secs(&e, &clock, 5.0);
    assert!(rms(&audio) > 1e-4);
    e.stop(false);
    assert_eq!(e.synth_voice_count(), 0);
}

// -- loop beds --------------------------------------------------------------

fn write_wav(path: &Path, sample_rate: u32, frames: usize) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut w = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        let v = ((i as f32 * 0.05).sin() * 6000.0) as i16;
        w.write_sample(v).unwrap();
        w.write_sample(v).unwrap();
    }
    w.finalize().unwrap();
}

fn fake_audio_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let scapes = dir.path().join("soundscapes");
    let music = dir.path().join("music");
    std::fs::create_dir_all(&scapes).unwrap();
    std::fs::create_dir_all(&music).unwrap();
    write_wav(&scapes.join("rain-light.wav"), 22050, 22050);
    write_wav(&scapes.join("rain-heavy.wav"), 22050, 22050);
    write_wav(&music.join("music-box.wav"), 44100, 44100);
    dir
}

fn wait_for_loops(e: &AmbientEngine, want: usize) -> bool {
    for _ in 0..100 {
        if e.loop_source_count() >= want {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn loop_presets_load_in_the_background_and_stop_with_the_cycle() {
    let root = fake_audio_root();
    let (e, clock) = engine_with_root(root.path());
    e.play(MusicParams {
        chord_notes: vec![220.0],
        soundscape_preset: Some("rain".to_string()),
        music_loop: Some("musicBox".to_string()),
        ..Default::default()
    });
    assert!(wait_for_loops(&e, 2), "loops never attached");

    // The loops are audible in the mix.
    let audio = render_secs(&e, &clock, 4.0);
    assert!(rms(&audio) > 1e-4);

    e.stop(false);
    assert_eq!(e.loop_source_count(), 0);
}

#[test]
fn superseded_loop_load_never_attaches() {
    let root = fake_audio_root();
    let (e, _clock) = engine_with_root(root.path());
    e.play(MusicParams {
        chord_notes: vec![220.0],
        soundscape_preset: Some("rain".to_string()),
        ..Default::default()
    });
    // Replace the cycle with one that wants no loops before the decode
    // worker can possibly have finished and checked its generation.
    e.play("dreamy-clouds");
    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(e.loop_source_count(), 0, "stale loop attached");
    assert_eq!(e.current_profile().as_deref(), Some("dreamy-clouds"));
}

#[test]
fn missing_loop_file_is_non_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let (e, clock) = engine_with_root(dir.path());
    e.play(MusicParams {
        chord_notes: vec![220.0],
        soundscape_preset: Some("rain".to_string()),
        music_loop: Some("nonexistent".to_string()),
        ..Default::default()
    });
    std::thread::sleep(Duration::from_millis(300));
    assert!(e.is_playing());
    assert_eq!(e.loop_source_count(), 0);
    // The synth layers are unaffected.
    let audio = render_secs(&e, &clock, 4.0);
    assert!(rms(&audio) > 1e-4);
}
