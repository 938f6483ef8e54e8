//! # Nocturne - Procedural Ambient Music Engine
//!
//! Nocturne generates endless, gently randomized soundscapes for sleep and
//! storytelling. There is no score: each soundscape is a stack of layers
//! that drift on jittered timers so it never repeats exactly.
//!
//! ## Core Features
//!
//! - **Layered Soundscapes**: chord pad, filtered noise bed, low drone,
//!   and three jittered melodic lines per profile
//! - **Atmospheric Events**: owls, crickets, waves, wind gusts, radar
//!   pings and more, on randomized timers
//! - **Four Pad Flavors**: detuned chorus, FM, resonant noise, plucked
//! - **Convolution Reverb**: generated decaying-noise impulse response,
//!   partitioned FFT convolution
//! - **Loop Beds**: preset recorded soundscape and music loops layered
//!   under the synths, decoded in the background and cached
//! - **Data-Driven**: eight built-in profiles, or custom soundscapes from
//!   a JSON `musicParams` bag
//! - **Race-Proof Lifecycle**: generation-counter cancellation makes
//!   stale timers and late async loads harmless
//!
//! ## Quick Start
//!
//! ```no_run
//! use nocturne::AmbientEngine;
//!
//! let mut engine = AmbientEngine::with_defaults();
//! engine.run_driver();
//! engine.play("forest-night");
//! std::thread::sleep(std::time::Duration::from_secs(30));
//! engine.stop(true);
//! ```

pub mod backend;
pub mod clock;
pub mod engine;
pub mod envelope;
pub mod events;
pub mod filter;
pub mod loops;
pub mod mixer;
pub mod noise;
pub mod osc;
pub mod param;
pub mod params;
pub mod profiles;
pub mod reverb;
pub mod scheduler;
pub mod voice;

pub use backend::{AudioBackend, ContextState, CpalBackend, OfflineBackend};
pub use clock::{Clock, ManualClock, WallClock};
pub use engine::{AmbientEngine, EngineConfig, Soundscape};
pub use events::EVENT_KINDS;
pub use noise::NoiseColor;
pub use osc::Waveform;
pub use params::{EventSpec, MusicParams, PadType};
pub use profiles::PROFILE_NAMES;
