//! Looped audio beds: preset tables, WAV decode, background loading.
//!
//! Alongside the synthesized layers the engine can run recorded loops on
//! the soundscape and music buses. The preset tables name the files that
//! ship with the app (several variants per soundscape; one file per music
//! loop) with per-preset gains. Decoding happens on a worker thread so
//! `play` never blocks on disk; the decoded buffers are cached so cycling
//! play/stop does not re-read files. A finished load checks the engine's
//! playing flag and generation before touching the graph, so loads that
//! outlive their play cycle evaporate.

use crate::mixer::{LoopVoice, MixerGraph};
use crate::params::MusicParams;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AudioLoadError {
    #[error("decode failed: {0}")]
    Decode(#[from] hound::Error),
    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(u16),
}

/// Decoded stereo audio, interleaved frames.
pub struct DecodedAudio {
    pub frames: Vec<[f32; 2]>,
    pub sample_rate: f32,
}

pub struct SoundscapePreset {
    /// Files to pick from at random, relative to `<root>/soundscapes/`.
    pub files: &'static [&'static str],
    pub gain: f32,
}

pub struct MusicLoopPreset {
    /// File relative to `<root>/music/`.
    pub file: &'static str,
    pub gain: f32,
}

/// A theme maps to an optional soundscape and an optional music loop.
pub struct ThemePreset {
    pub soundscape: Option<&'static str>,
    pub music_loop: Option<&'static str>,
}

lazy_static! {
    static ref SOUNDSCAPES: HashMap<&'static str, SoundscapePreset> = {
        let mut m = HashMap::new();
        m.insert("rain", SoundscapePreset { files: &["rain-light.wav", "rain-heavy.wav"], gain: 0.35 });
        m.insert("ocean", SoundscapePreset { files: &["ocean-waves.wav"], gain: 0.4 });
        m.insert("forest", SoundscapePreset { files: &["forest-night.wav"], gain: 0.3 });
        m.insert("wind", SoundscapePreset { files: &["wind-soft.wav"], gain: 0.25 });
        m.insert("heartbeat", SoundscapePreset { files: &["heartbeat-womb.wav"], gain: 0.45 });
        m.insert("fireplace", SoundscapePreset { files: &["fireplace-crackle.wav"], gain: 0.35 });
        m.insert("starryNight", SoundscapePreset { files: &["night-ambience.wav"], gain: 0.25 });
        m.insert("garden", SoundscapePreset { files: &["garden-day.wav"], gain: 0.3 });
        m.insert("snow", SoundscapePreset { files: &["winter-wind.wav"], gain: 0.25 });
        m.insert("thunder", SoundscapePreset { files: &["thunder-distant.wav"], gain: 0.3 });
        m.insert("river", SoundscapePreset { files: &["river-stream.wav"], gain: 0.35 });
        m.insert("desert", SoundscapePreset { files: &["desert-night.wav"], gain: 0.2 });
        m
    };
    static ref MUSIC_LOOPS: HashMap<&'static str, MusicLoopPreset> = {
        let mut m = HashMap::new();
        m.insert("pianoLullaby", MusicLoopPreset { file: "piano-lullaby.wav", gain: 0.3 });
        m.insert("musicBox", MusicLoopPreset { file: "music-box.wav", gain: 0.25 });
        m.insert("gentleGuitar", MusicLoopPreset { file: "gentle-guitar.wav", gain: 0.3 });
        m.insert("etherealPad", MusicLoopPreset { file: "ethereal-pad.wav", gain: 0.25 });
        m.insert("softStrings", MusicLoopPreset { file: "soft-strings.wav", gain: 0.3 });
        m.insert("calmHarp", MusicLoopPreset { file: "calm-harp.wav", gain: 0.3 });
        m.insert("cosmicSynth", MusicLoopPreset { file: "cosmic-synth.wav", gain: 0.25 });
        m.insert("oceanMelody", MusicLoopPreset { file: "ocean-melody.wav", gain: 0.3 });
        m.insert("forestFlute", MusicLoopPreset { file: "forest-flute.wav", gain: 0.3 });
        m.insert("nightPiano", MusicLoopPreset { file: "night-piano.wav", gain: 0.3 });
        m
    };
    static ref THEMES: HashMap<&'static str, ThemePreset> = {
        let mut m = HashMap::new();
        m.insert("space", ThemePreset { soundscape: Some("starryNight"), music_loop: Some("cosmicSynth") });
        m.insert("ocean", ThemePreset { soundscape: Some("ocean"), music_loop: Some("oceanMelody") });
        m.insert("forest", ThemePreset { soundscape: Some("forest"), music_loop: Some("forestFlute") });
        m.insert("garden", ThemePreset { soundscape: Some("garden"), music_loop: Some("gentleGuitar") });
        m.insert("winter", ThemePreset { soundscape: Some("snow"), music_loop: Some("pianoLullaby") });
        m.insert("rain", ThemePreset { soundscape: Some("rain"), music_loop: Some("softStrings") });
        m.insert("campfire", ThemePreset { soundscape: Some("fireplace"), music_loop: Some("calmHarp") });
        m.insert("night", ThemePreset { soundscape: Some("starryNight"), music_loop: Some("nightPiano") });
        m
    };
}

/// Preset for newborn mode: womb heartbeat under a music box.
pub const BABY_PRESET: ThemePreset = ThemePreset {
    soundscape: Some("heartbeat"),
    music_loop: Some("musicBox"),
};

pub fn soundscape_preset(name: &str) -> Option<&'static SoundscapePreset> {
    SOUNDSCAPES.get(name)
}

pub fn music_loop_preset(name: &str) -> Option<&'static MusicLoopPreset> {
    MUSIC_LOOPS.get(name)
}

pub fn theme_preset(name: &str) -> Option<&'static ThemePreset> {
    THEMES.get(name)
}

/// Parameter bag for a named theme: the theme's loops under the default
/// synth stack. What a story page gets when it names a theme instead of
/// spelling out `musicParams`.
pub fn theme_params(name: &str) -> Option<MusicParams> {
    theme_preset(name).map(params_for_theme)
}

/// Newborn mode: womb heartbeat under a music box.
pub fn baby_params() -> MusicParams {
    params_for_theme(&BABY_PRESET)
}

fn params_for_theme(theme: &ThemePreset) -> MusicParams {
    MusicParams {
        soundscape_preset: theme.soundscape.map(str::to_string),
        music_loop: theme.music_loop.map(str::to_string),
        ..Default::default()
    }
}

pub fn theme_names() -> Vec<&'static str> {
    let mut names: Vec<_> = THEMES.keys().copied().collect();
    names.sort_unstable();
    names
}

pub fn soundscape_names() -> Vec<&'static str> {
    let mut names: Vec<_> = SOUNDSCAPES.keys().copied().collect();
    names.sort_unstable();
    names
}

pub fn music_loop_names() -> Vec<&'static str> {
    let mut names: Vec<_> = MUSIC_LOOPS.keys().copied().collect();
    names.sort_unstable();
    names
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum LoopBus {
    Soundscape,
    Music,
}

/// Loads and caches loop files. One per engine, shared with the worker
/// threads that do the decoding.
pub struct LoopLoader {
    root: PathBuf,
    cache: Mutex<HashMap<PathBuf, Arc<DecodedAudio>>>,
}

impl LoopLoader {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn soundscape_path(&self, file: &str) -> PathBuf {
        self.root.join("soundscapes").join(file)
    }

    pub fn music_path(&self, file: &str) -> PathBuf {
        self.root.join("music").join(file)
    }

    /// Decode a WAV file, caching the result. Cache hits share the buffer.
    pub fn load(&self, path: &Path) -> Result<Arc<DecodedAudio>, AudioLoadError> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(audio) = cache.get(path) {
                return Ok(audio.clone());
            }
        }
        let audio = Arc::new(decode_wav(path)?);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(path.to_path_buf(), audio.clone());
        }
        Ok(audio)
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Load `path` on a worker thread and, if the originating play cycle
    /// is still current when the decode finishes, attach it to `bus`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn_load(
        self: &Arc<Self>,
        path: PathBuf,
        gain: f32,
        bus: LoopBus,
        graph: Arc<Mutex<MixerGraph>>,
        playing: Arc<AtomicBool>,
        generation: Arc<AtomicU64>,
        my_generation: u64,
        engine_rate: f32,
    ) {
        let loader = self.clone();
        std::thread::spawn(move || {
            let audio = match loader.load(&path) {
                Ok(a) => a,
                Err(e) => {
                    warn!(path = %path.display(), "failed to load loop: {}", e);
                    return;
                }
            };
            if let Ok(mut g) = graph.lock() {
                // Checked under the graph lock: a new cycle bumps the
                // generation before it rebuilds buses, and rebuilding
                // needs this same lock, so the check and the attach
                // cannot straddle a teardown.
                if !playing.load(Ordering::SeqCst)
                    || generation.load(Ordering::SeqCst) != my_generation
                {
                    debug!(path = %path.display(), "loop load superseded, dropping");
                    return;
                }
                let voice = LoopVoice::new(audio, gain, engine_rate);
                match bus {
                    LoopBus::Soundscape => g.add_soundscape_loop(voice),
                    LoopBus::Music => g.add_music_loop(voice),
                }
            }
        });
    }
}

fn decode_wav(path: &Path) -> Result<DecodedAudio, AudioLoadError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels;
    if channels == 0 || channels > 2 {
        return Err(AudioLoadError::UnsupportedChannels(channels));
    }
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };
    let frames = if channels == 1 {
        samples.iter().map(|&s| [s, s]).collect()
    } else {
        samples.chunks_exact(2).map(|c| [c[0], c[1]]).collect()
    };
    Ok(DecodedAudio {
        frames,
        sample_rate: spec.sample_rate as f32,
    })
}
