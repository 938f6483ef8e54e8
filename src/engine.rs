//! The ambient engine: lifecycle, volume, and the glue between scheduler,
//! mixer and backend.
//!
//! One engine owns one persistent master gain and at most one live "play
//! cycle" (buses, voices, timers, pending loop loads). The rules the whole
//! design hangs on:
//!
//! - Every play cycle gets a fresh generation number. Timers and loop
//!   loads are tagged with it; anything tagged with an old generation is
//!   inert, however late it fires.
//! - `play` while already playing tears the old cycle down immediately
//!   (no fade) and cancels any pending fade cleanup before building the
//!   new cycle, so a cleanup armed by an earlier `stop(fade)` can never
//!   destroy the replacement.
//! - `stop(fade)` ramps the master down and arms a cleanup for
//!   fade + 0.2 s later; `stop(false)` cleans up on the spot. Teardown is
//!   dropping the buses, so there is no per-node bookkeeping to get wrong.
//!
//! The engine is driven by `tick`, either manually (tests, offline
//! render) or by the background driver thread `run_driver` spawns.

use crate::backend::{self, AudioBackend, ContextState, CpalBackend};
use crate::clock::{Clock, WallClock};
use crate::loops::{self, LoopBus, LoopLoader};
use crate::mixer::MixerGraph;
use crate::params::MusicParams;
use crate::profiles;
use crate::reverb::ConvolverReverb;
use crate::scheduler::{Scheduler, SoundCtx};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often the driver thread ticks the scheduler.
const DRIVER_PERIOD: Duration = Duration::from_millis(50);

/// What to play: a built-in profile by name, or a parameter bag.
pub enum Soundscape {
    Profile(String),
    Params(Box<MusicParams>),
}

impl From<&str> for Soundscape {
    fn from(name: &str) -> Self {
        Soundscape::Profile(name.to_string())
    }
}

impl From<String> for Soundscape {
    fn from(name: String) -> Self {
        Soundscape::Profile(name)
    }
}

impl From<MusicParams> for Soundscape {
    fn from(params: MusicParams) -> Self {
        Soundscape::Params(Box::new(params))
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fade-in on play and fade-out on `stop(true)`, in seconds.
    pub fade_seconds: f32,
    pub initial_volume: f32,
    /// Directory holding `soundscapes/` and `music/`.
    pub audio_root: PathBuf,
    /// Seed the RNG for reproducible renders.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fade_seconds: 3.0,
            initial_volume: 0.3,
            audio_root: PathBuf::from("assets/audio"),
            seed: None,
        }
    }
}

struct Core {
    backend: Box<dyn AudioBackend>,
    backend_started: bool,
    sched: Scheduler,
    rng: SmallRng,
    loader: Arc<LoopLoader>,
    volume: f32,
    fade_seconds: f32,
    current_profile: Option<String>,
    /// Deadline for the cleanup armed by a fading stop.
    pending_cleanup: Option<Duration>,
}

pub struct AmbientEngine {
    core: Arc<Mutex<Core>>,
    graph: Arc<Mutex<MixerGraph>>,
    clock: Arc<dyn Clock>,
    playing: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    driver: Option<JoinHandle<()>>,
    driver_stop: Arc<AtomicBool>,
}

impl AmbientEngine {
    pub fn new(backend: Box<dyn AudioBackend>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        let sample_rate = backend.sample_rate();
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let core = Core {
            backend,
            backend_started: false,
            sched: Scheduler::new(),
            rng,
            loader: Arc::new(LoopLoader::new(config.audio_root)),
            volume: config.initial_volume.clamp(0.0, 1.0),
            fade_seconds: config.fade_seconds,
            current_profile: None,
            pending_cleanup: None,
        };
        Self {
            core: Arc::new(Mutex::new(core)),
            graph: Arc::new(Mutex::new(MixerGraph::new(sample_rate))),
            clock,
            playing: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            driver: None,
            driver_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Live engine on the default output device, wall clock, default
    /// config.
    pub fn with_defaults() -> Self {
        Self::new(
            Box::new(CpalBackend::new()),
            Arc::new(WallClock::new()),
            EngineConfig::default(),
        )
    }

    /// Start a soundscape. Replaces whatever is playing; an unknown
    /// profile name is logged and leaves the current state untouched.
    pub fn play(&self, source: impl Into<Soundscape>) {
        let source = source.into();
        if let Soundscape::Profile(name) = &source {
            if profiles::profile_params(name).is_none() {
                warn!(profile = %name, "unknown profile, ignoring play request");
                return;
            }
        }

        let mut core = self.core.lock().unwrap();
        let now = self.clock.now();

        // A pending fade cleanup belongs to the cycle being replaced. Run
        // it now so it cannot fire later and gut the new cycle.
        if core.pending_cleanup.take().is_some() {
            Self::cleanup(&mut core, &self.graph);
        }
        if self.playing.load(Ordering::SeqCst) {
            debug!("play while playing, immediate teardown of current cycle");
            Self::cleanup(&mut core, &self.graph);
        }
        self.graph.lock().unwrap().set_master(0.0);

        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if !core.backend_started {
            core.backend.start(self.graph.clone());
            core.backend_started = true;
        }
        if core.backend.state() == ContextState::Suspended {
            // May be refused (no device, autoplay gate). Playback state
            // advances regardless; audio starts when the backend does.
            core.backend.resume();
        }

        let label = match &source {
            Soundscape::Profile(name) => name.clone(),
            Soundscape::Params(_) => "custom-params".to_string(),
        };
        info!(profile = %label, generation = my_generation, "starting soundscape");
        self.playing.store(true, Ordering::SeqCst);
        core.current_profile = Some(label);

        {
            let mut graph = self.graph.lock().unwrap();
            let reverb = match ConvolverReverb::new(graph.sample_rate(), &mut core.rng) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!("reverb unavailable, continuing dry: {}", e);
                    None
                }
            };
            graph.build_buses(reverb);
            let mut cx = SoundCtx::new(&mut graph, &mut core.rng, now, my_generation);
            match &source {
                Soundscape::Profile(name) => {
                    profiles::build_profile(&mut cx, name);
                }
                Soundscape::Params(params) => profiles::build_from_params(&mut cx, params),
            }
            let jobs = cx.into_jobs();
            core.sched.absorb(jobs);
            let target = core.volume;
            let fade = core.fade_seconds;
            graph.fade_master_to(target, fade);
        }

        if let Soundscape::Params(params) = &source {
            self.start_loops(&mut core, params, my_generation);
        }
    }

    fn start_loops(&self, core: &mut Core, params: &MusicParams, my_generation: u64) {
        let engine_rate = self.graph.lock().unwrap().sample_rate();
        if let Some(name) = &params.soundscape_preset {
            match loops::soundscape_preset(name) {
                Some(preset) => {
                    let file = preset.files[core.rng.gen_range(0..preset.files.len())];
                    let path = core.loader.soundscape_path(file);
                    core.loader.spawn_load(
                        path,
                        preset.gain,
                        LoopBus::Soundscape,
                        self.graph.clone(),
                        self.playing.clone(),
                        self.generation.clone(),
                        my_generation,
                        engine_rate,
                    );
                }
                None => warn!(preset = %name, "unknown soundscape preset, skipping"),
            }
        }
        if let Some(name) = &params.music_loop {
            match loops::music_loop_preset(name) {
                Some(preset) => {
                    let path = core.loader.music_path(preset.file);
                    core.loader.spawn_load(
                        path,
                        preset.gain,
                        LoopBus::Music,
                        self.graph.clone(),
                        self.playing.clone(),
                        self.generation.clone(),
                        my_generation,
                        engine_rate,
                    );
                }
                None => warn!(preset = %name, "unknown music loop, skipping"),
            }
        }
    }

    /// Stop playback. With `fade` the master ramps down over the fade time
    /// and teardown happens shortly after the ramp lands; without it,
    /// everything is gone when this returns.
    pub fn stop(&self, fade: bool) {
        let mut core = self.core.lock().unwrap();
        if !self.playing.load(Ordering::SeqCst) && core.pending_cleanup.is_none() {
            return;
        }
        let now = self.clock.now();
        if fade {
            let secs = core.fade_seconds;
            self.graph.lock().unwrap().fade_master_to(0.0, secs);
            core.pending_cleanup =
                Some(now + Duration::from_secs_f32(secs) + Duration::from_millis(200));
            debug!("fading out, cleanup armed");
        } else {
            core.pending_cleanup = None;
            self.graph.lock().unwrap().set_master(0.0);
            Self::cleanup(&mut core, &self.graph);
        }
        self.playing.store(false, Ordering::SeqCst);
        core.current_profile = None;
    }

    fn cleanup(core: &mut Core, graph: &Mutex<MixerGraph>) {
        core.sched.clear();
        graph.lock().unwrap().teardown_buses();
    }

    /// Advance the engine: run the armed fade cleanup if due, then fire
    /// due timers. The scheduler runs even while the backend is suspended,
    /// same as timers keep firing when an audio context is gated; voices
    /// pile into the silent graph and are heard on resume.
    pub fn tick(&self) {
        Self::tick_inner(
            &self.core,
            &self.graph,
            self.clock.as_ref(),
            &self.playing,
            &self.generation,
        );
    }

    fn tick_inner(
        core: &Mutex<Core>,
        graph: &Mutex<MixerGraph>,
        clock: &dyn Clock,
        playing: &AtomicBool,
        generation: &AtomicU64,
    ) {
        let mut core = core.lock().unwrap();
        let now = clock.now();
        if let Some(due) = core.pending_cleanup {
            if now >= due {
                core.pending_cleanup = None;
                Self::cleanup(&mut core, graph);
                debug!("fade cleanup ran");
            }
        }
        if playing.load(Ordering::SeqCst) {
            let gen = generation.load(Ordering::SeqCst);
            let core = &mut *core;
            let mut graph = graph.lock().unwrap();
            core.sched.tick(now, gen, &mut graph, &mut core.rng);
        }
    }

    /// Spawn the background thread that ticks the engine every 50 ms.
    pub fn run_driver(&mut self) {
        if self.driver.is_some() {
            return;
        }
        self.driver_stop.store(false, Ordering::SeqCst);
        let core = self.core.clone();
        let graph = self.graph.clone();
        let clock = self.clock.clone();
        let playing = self.playing.clone();
        let generation = self.generation.clone();
        let stop = self.driver_stop.clone();
        self.driver = Some(std::thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                Self::tick_inner(&core, &graph, clock.as_ref(), &playing, &generation);
                std::thread::sleep(DRIVER_PERIOD);
            }
        }));
    }

    /// Suspend audio output. Playback state and timers are untouched.
    pub fn pause(&self) {
        self.core.lock().unwrap().backend.suspend();
    }

    /// Resume audio output after `pause` (or an autoplay gate).
    pub fn resume(&self) {
        self.core.lock().unwrap().backend.resume();
    }

    /// Block until the backend reports running, up to `timeout`.
    pub fn wait_until_running(&self, timeout: Duration) -> bool {
        let core = self.core.lock().unwrap();
        backend::wait_until_running(core.backend.as_ref(), timeout)
    }

    /// Set the master volume, clamped to [0, 1]. Audible as a short ramp
    /// when playing; always reported back exactly as clamped.
    pub fn set_volume(&self, volume: f32) {
        let mut core = self.core.lock().unwrap();
        let volume = volume.clamp(0.0, 1.0);
        core.volume = volume;
        if self.playing.load(Ordering::SeqCst) {
            self.graph.lock().unwrap().fade_master_to(volume, 0.3);
        }
    }

    pub fn volume(&self) -> f32 {
        self.core.lock().unwrap().volume
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn current_profile(&self) -> Option<String> {
        self.core.lock().unwrap().current_profile.clone()
    }

    pub fn context_state(&self) -> ContextState {
        self.core.lock().unwrap().backend.state()
    }

    /// The shared mixer graph. Offline rendering pulls samples from here.
    pub fn graph(&self) -> Arc<Mutex<MixerGraph>> {
        self.graph.clone()
    }

    // Diagnostics, used by the lifecycle tests to prove teardown is total.

    pub fn synth_voice_count(&self) -> usize {
        self.graph.lock().unwrap().synth_voice_count()
    }

    pub fn loop_source_count(&self) -> usize {
        self.graph.lock().unwrap().loop_source_count()
    }

    pub fn scheduled_job_count(&self) -> usize {
        self.core.lock().unwrap().sched.len()
    }

    /// Full shutdown: stop, kill the driver, close the backend, drop the
    /// decode cache. The engine is inert afterwards.
    pub fn destroy(&mut self) {
        self.stop(false);
        self.driver_stop.store(true, Ordering::SeqCst);
        if let Some(t) = self.driver.take() {
            let _ = t.join();
        }
        let mut core = self.core.lock().unwrap();
        core.backend.close();
        core.loader.clear();
    }
}

impl Drop for AmbientEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}
