//! Jittered event scheduling.
//!
//! The generative layer is a pile of timers: melody every ~3.5 s, an owl
//! every ~12 s, all with per-fire jitter so nothing sounds mechanical. The
//! scheduler owns those timers as data. Every job carries the generation
//! of the play cycle that created it; `tick` silently drops jobs from any
//! other generation, which is the whole cancellation story - stale
//! callbacks from a superseded cycle can never touch the current graph.
//!
//! Jobs run against a [`SoundCtx`], which wraps the mixer graph and the
//! engine RNG and offers the voice-spawning helpers. Profile builders get
//! the same context at play() time, so a recipe reads identically whether
//! it fires now or from a timer.

use crate::mixer::MixerGraph;
use crate::voice::{
    Drone, DroneSpec, FmPad, FmPadSpec, NoiseBed, NoiseBedSpec, NoiseBurstSpec, NoiseBurstVoice,
    PadSpec, PadVoice, ResonantPad, ResonantPadSpec, ToneSpec, ToneVoice, VoiceNode,
};
use rand::rngs::SmallRng;
use rand::Rng;
use std::time::Duration;

// Safety valve for pathological zero-interval jobs.
const MAX_JOBS_PER_TICK: usize = 1000;

enum JobBody {
    Once(Option<Box<dyn FnOnce(&mut SoundCtx) + Send>>),
    Every {
        base: Duration,
        jitter: f32,
        f: Box<dyn FnMut(&mut SoundCtx) + Send>,
    },
}

pub(crate) struct Job {
    due: Duration,
    generation: u64,
    body: JobBody,
}

fn jittered(base: Duration, jitter: f32, rng: &mut SmallRng) -> Duration {
    let jitter = jitter.clamp(0.0, 0.9);
    let factor = 1.0 - jitter + rng.gen::<f32>() * jitter * 2.0;
    Duration::from_secs_f64((base.as_secs_f64() * factor as f64).max(0.001))
}

/// The context sound-producing code runs in: the live graph, the engine
/// RNG, and scheduling of further work within the same play cycle.
pub struct SoundCtx<'a> {
    pub graph: &'a mut MixerGraph,
    pub rng: &'a mut SmallRng,
    pub sample_rate: f32,
    pub now: Duration,
    generation: u64,
    spawned: Vec<Job>,
}

impl<'a> SoundCtx<'a> {
    pub(crate) fn new(
        graph: &'a mut MixerGraph,
        rng: &'a mut SmallRng,
        now: Duration,
        generation: u64,
    ) -> Self {
        let sample_rate = graph.sample_rate();
        Self {
            graph,
            rng,
            sample_rate,
            now,
            generation,
            spawned: Vec::new(),
        }
    }

    pub(crate) fn into_jobs(self) -> Vec<Job> {
        self.spawned
    }

    // -- voice helpers ------------------------------------------------------

    pub fn tone(&mut self, spec: ToneSpec) {
        self.graph
            .add_voice(VoiceNode::Tone(ToneVoice::new(spec, self.sample_rate)));
    }

    pub fn noise_burst(&mut self, spec: NoiseBurstSpec) {
        self.graph.add_voice(VoiceNode::NoiseBurst(NoiseBurstVoice::new(
            spec,
            self.sample_rate,
            self.rng,
        )));
    }

    pub fn chorus_pad(&mut self, notes: &[f32], spec: &PadSpec) {
        self.graph
            .add_voice(VoiceNode::Pad(PadVoice::chorus(notes, spec, self.sample_rate)));
    }

    pub fn simple_pad(&mut self, notes: &[f32], spec: &PadSpec) {
        self.graph
            .add_voice(VoiceNode::Pad(PadVoice::simple(notes, spec, self.sample_rate)));
    }

    pub fn fm_pad(&mut self, notes: &[f32], spec: &FmPadSpec) {
        self.graph
            .add_voice(VoiceNode::FmPad(FmPad::new(notes, spec, self.sample_rate)));
    }

    pub fn resonant_pad(&mut self, notes: &[f32], spec: &ResonantPadSpec) {
        self.graph.add_voice(VoiceNode::ResonantPad(ResonantPad::new(
            notes,
            spec,
            self.sample_rate,
            self.rng,
        )));
    }

    pub fn drone(&mut self, freq: f32, spec: &DroneSpec) {
        self.graph
            .add_voice(VoiceNode::Drone(Drone::new(freq, spec, self.sample_rate)));
    }

    pub fn noise_bed(&mut self, spec: &NoiseBedSpec) {
        self.graph.add_voice(VoiceNode::NoiseBed(NoiseBed::new(
            spec,
            self.sample_rate,
            self.rng,
        )));
    }

    // -- scheduling ---------------------------------------------------------

    /// Run `f` once after `delay`, in this cycle's generation.
    pub fn after(&mut self, delay: Duration, f: impl FnOnce(&mut SoundCtx) + Send + 'static) {
        self.spawned.push(Job {
            due: self.now + delay,
            generation: self.generation,
            body: JobBody::Once(Some(Box::new(f))),
        });
    }

    /// Run `f` roughly every `base`, each gap scaled by
    /// `1 - jitter .. 1 + jitter`. The first firing lands at a random
    /// offset within `base` so layers do not start in lockstep.
    pub fn every(
        &mut self,
        base: Duration,
        jitter: f32,
        f: impl FnMut(&mut SoundCtx) + Send + 'static,
    ) {
        let offset = Duration::from_secs_f64(base.as_secs_f64() * self.rng.gen::<f64>());
        self.every_after(base, jitter, offset, f);
    }

    /// Like [`every`](Self::every) with an explicit first delay.
    pub fn every_after(
        &mut self,
        base: Duration,
        jitter: f32,
        first_delay: Duration,
        f: impl FnMut(&mut SoundCtx) + Send + 'static,
    ) {
        self.spawned.push(Job {
            due: self.now + first_delay,
            generation: self.generation,
            body: JobBody::Every {
                base,
                jitter,
                f: Box::new(f),
            },
        });
    }
}

#[derive(Default)]
pub(crate) struct Scheduler {
    jobs: Vec<Job>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn absorb(&mut self, jobs: Vec<Job>) {
        self.jobs.extend(jobs);
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Run every due job of the current generation. Jobs from other
    /// generations are discarded here, not run.
    pub fn tick(
        &mut self,
        now: Duration,
        generation: u64,
        graph: &mut MixerGraph,
        rng: &mut SmallRng,
    ) {
        self.jobs.retain(|j| j.generation == generation);
        for _ in 0..MAX_JOBS_PER_TICK {
            let Some(idx) = self.jobs.iter().position(|j| j.due <= now) else {
                break;
            };
            let mut job = self.jobs.swap_remove(idx);
            let mut ctx = SoundCtx::new(graph, rng, now, generation);
            let requeue = match &mut job.body {
                JobBody::Once(f) => {
                    if let Some(f) = f.take() {
                        f(&mut ctx);
                    }
                    false
                }
                JobBody::Every { base, jitter, f } => {
                    f(&mut ctx);
                    job.due = now + jittered(*base, *jitter, ctx.rng);
                    true
                }
            };
            let spawned = ctx.into_jobs();
            if requeue {
                self.jobs.push(job);
            }
            self.jobs.extend(spawned);
        }
    }
}
