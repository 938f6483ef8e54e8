//! Audio output backends.
//!
//! The engine talks to audio hardware through the [`AudioBackend`] trait
//! and never holds a device handle itself. Two implementations:
//!
//! - [`CpalBackend`] drives the default output device. cpal streams are
//!   not `Send`, so the stream lives on a dedicated thread and the backend
//!   sends it pause/resume commands over a channel.
//! - [`OfflineBackend`] has no device at all. Tests and the offline
//!   renderer pull samples straight out of the mixer graph; the backend
//!   only models the running/suspended state machine, including starting
//!   suspended the way a browser-style autoplay gate would.
//!
//! Output failures are never fatal to the engine: a backend that cannot
//! open a device logs a warning and reports itself suspended.

use crate::mixer::MixerGraph;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

pub trait AudioBackend: Send {
    /// Attach the graph and begin output. Idempotent; failures downgrade
    /// the backend to `Suspended` rather than erroring.
    fn start(&mut self, graph: Arc<Mutex<MixerGraph>>);
    fn state(&self) -> ContextState;
    fn resume(&mut self);
    fn suspend(&mut self);
    fn close(&mut self);
    fn sample_rate(&self) -> f32;
}

/// Poll a backend until it reports `Running` or the timeout passes.
/// Returns whether it is running. Useful right after `resume` on devices
/// that take a moment to open.
pub fn wait_until_running(backend: &dyn AudioBackend, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if backend.state() == ContextState::Running {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

enum StreamCmd {
    Resume,
    Suspend,
    Close,
}

pub struct CpalBackend {
    sample_rate: f32,
    state: Arc<Mutex<ContextState>>,
    cmd_tx: Option<Sender<StreamCmd>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalBackend {
    pub fn new() -> Self {
        let sample_rate = match cpal::default_host()
            .default_output_device()
            .and_then(|d| d.default_output_config().ok())
        {
            Some(config) => config.sample_rate().0 as f32,
            None => {
                warn!("no default output device, assuming 44.1 kHz");
                44100.0
            }
        };
        Self {
            sample_rate,
            state: Arc::new(Mutex::new(ContextState::Suspended)),
            cmd_tx: None,
            thread: None,
        }
    }

    fn set_state(state: &Arc<Mutex<ContextState>>, value: ContextState) {
        if let Ok(mut s) = state.lock() {
            *s = value;
        }
    }

    fn run_stream(graph: Arc<Mutex<MixerGraph>>, state: Arc<Mutex<ContextState>>, rx: Receiver<StreamCmd>) {
        let device = match cpal::default_host().default_output_device() {
            Some(d) => d,
            None => {
                warn!("no output device available");
                Self::set_state(&state, ContextState::Suspended);
                return;
            }
        };
        let config = match device.default_output_config() {
            Ok(c) => c,
            Err(e) => {
                warn!("no default output config: {}", e);
                Self::set_state(&state, ContextState::Suspended);
                return;
            }
        };
        if config.sample_format() != cpal::SampleFormat::F32 {
            warn!("unsupported sample format {:?}", config.sample_format());
            Self::set_state(&state, ContextState::Suspended);
            return;
        }
        let channels = config.channels() as usize;
        let stream = device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if let Ok(mut g) = graph.lock() {
                    g.render(data, channels);
                } else {
                    data.fill(0.0);
                }
            },
            |err| warn!("stream error: {}", err),
            None,
        );
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!("failed to build output stream: {}", e);
                Self::set_state(&state, ContextState::Suspended);
                return;
            }
        };
        if let Err(e) = stream.play() {
            warn!("failed to start stream: {}", e);
            Self::set_state(&state, ContextState::Suspended);
        } else {
            info!("audio stream running");
            Self::set_state(&state, ContextState::Running);
        }
        // Own the stream until told to close. Recv error means the backend
        // was dropped; treat it as close.
        while let Ok(cmd) = rx.recv() {
            match cmd {
                StreamCmd::Suspend => {
                    if stream.pause().is_ok() {
                        Self::set_state(&state, ContextState::Suspended);
                    }
                }
                StreamCmd::Resume => {
                    if stream.play().is_ok() {
                        Self::set_state(&state, ContextState::Running);
                    }
                }
                StreamCmd::Close => break,
            }
        }
        Self::set_state(&state, ContextState::Closed);
    }

    fn send(&self, cmd: StreamCmd) {
        if let Some(tx) = &self.cmd_tx {
            // A dead stream thread just means the command is moot.
            let _ = tx.send(cmd);
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn start(&mut self, graph: Arc<Mutex<MixerGraph>>) {
        if self.thread.is_some() {
            return;
        }
        let (tx, rx) = mpsc::channel();
        self.cmd_tx = Some(tx);
        let state = self.state.clone();
        self.thread = Some(std::thread::spawn(move || {
            Self::run_stream(graph, state, rx);
        }));
    }

    fn state(&self) -> ContextState {
        self.state.lock().map(|s| *s).unwrap_or(ContextState::Closed)
    }

    fn resume(&mut self) {
        self.send(StreamCmd::Resume);
    }

    fn suspend(&mut self) {
        self.send(StreamCmd::Suspend);
    }

    fn close(&mut self) {
        self.send(StreamCmd::Close);
        self.cmd_tx = None;
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
        Self::set_state(&self.state, ContextState::Closed);
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.close();
    }
}

/// Deviceless backend for tests and offline rendering.
pub struct OfflineBackend {
    sample_rate: f32,
    state: ContextState,
    autoplay_blocked: bool,
    started: bool,
}

impl OfflineBackend {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            state: ContextState::Suspended,
            autoplay_blocked: false,
            started: false,
        }
    }

    /// A backend that refuses to run on `start`, mimicking an autoplay
    /// gate: it stays suspended until an explicit `resume`.
    pub fn new_blocked(sample_rate: f32) -> Self {
        Self {
            autoplay_blocked: true,
            ..Self::new(sample_rate)
        }
    }
}

impl AudioBackend for OfflineBackend {
    fn start(&mut self, _graph: Arc<Mutex<MixerGraph>>) {
        self.started = true;
        if !self.autoplay_blocked {
            self.state = ContextState::Running;
        }
    }

    fn state(&self) -> ContextState {
        self.state
    }

    fn resume(&mut self) {
        if self.started && self.state != ContextState::Closed {
            self.state = ContextState::Running;
        }
    }

    fn suspend(&mut self) {
        if self.state == ContextState::Running {
            self.state = ContextState::Suspended;
        }
    }

    fn close(&mut self) {
        self.state = ContextState::Closed;
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_backend_state_machine() {
        let graph = Arc::new(Mutex::new(MixerGraph::new(44100.0)));
        let mut b = OfflineBackend::new(44100.0);
        assert_eq!(b.state(), ContextState::Suspended);
        b.start(graph.clone());
        assert_eq!(b.state(), ContextState::Running);
        b.suspend();
        assert_eq!(b.state(), ContextState::Suspended);
        b.resume();
        assert_eq!(b.state(), ContextState::Running);
        b.close();
        assert_eq!(b.state(), ContextState::Closed);
        b.resume();
        assert_eq!(b.state(), ContextState::Closed);
    }

    #[test]
    fn blocked_backend_needs_explicit_resume() {
        let graph = Arc::new(Mutex::new(MixerGraph::new(44100.0)));
        let mut b = OfflineBackend::new_blocked(44100.0);
        b.start(graph);
        assert_eq!(b.state(), ContextState::Suspended);
        b.resume();
        assert_eq!(b.state(), ContextState::Running);
    }

    #[test]
    fn wait_until_running_times_out_when_suspended() {
        let b = OfflineBackend::new(8000.0);
        assert!(!wait_until_running(&b, Duration::from_millis(50)));
    }
}
