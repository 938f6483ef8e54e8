//! Nocturne CLI - play soundscapes live, render them to WAV, list presets

use clap::{Parser, Subcommand};
use nocturne::{
    engine::Soundscape, AmbientEngine, EngineConfig, ManualClock, MusicParams, OfflineBackend,
    WallClock, EVENT_KINDS, PROFILE_NAMES,
};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "nocturne")]
#[command(about = "Procedural ambient music engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a soundscape on the default output device
    Play {
        /// Profile or theme name, or inline musicParams JSON
        soundscape: String,
        /// How long to play, in seconds
        #[arg(short, long, default_value = "60")]
        duration: f32,
        /// Master volume, 0 to 1
        #[arg(short, long, default_value = "0.3")]
        volume: f32,
        /// Directory holding soundscapes/ and music/ loop files
        #[arg(long, default_value = "assets/audio")]
        audio_root: PathBuf,
    },
    /// Render a soundscape offline to a WAV file
    Render {
        /// Profile or theme name, or inline musicParams JSON
        soundscape: String,
        /// Output WAV path
        #[arg(short, long, default_value = "nocturne.wav")]
        output: PathBuf,
        /// Length of the render before the fade-out, in seconds
        #[arg(short, long, default_value = "30")]
        duration: f32,
        #[arg(long, default_value = "44100")]
        sample_rate: u32,
        /// Master volume, 0 to 1
        #[arg(short, long, default_value = "0.3")]
        volume: f32,
        /// RNG seed for a reproducible render
        #[arg(long)]
        seed: Option<u64>,
    },
    /// List built-in profiles, event kinds and loop presets
    List,
}

fn parse_soundscape(arg: &str) -> Result<Soundscape, Box<dyn Error>> {
    if arg.trim_start().starts_with('{') {
        let params: MusicParams = serde_json::from_str(arg)?;
        return Ok(Soundscape::from(params));
    }
    if arg == "baby" {
        return Ok(Soundscape::from(nocturne::loops::baby_params()));
    }
    // Theme names resolve to their loop pairing over the default synths.
    if let Some(params) = nocturne::loops::theme_params(arg) {
        return Ok(Soundscape::from(params));
    }
    if !PROFILE_NAMES.contains(&arg) {
        return Err(format!(
            "unknown profile '{}' (try one of: {})",
            arg,
            PROFILE_NAMES.join(", ")
        )
        .into());
    }
    Ok(Soundscape::from(arg))
}

fn cmd_play(
    soundscape: String,
    duration: f32,
    volume: f32,
    audio_root: PathBuf,
) -> Result<(), Box<dyn Error>> {
    let source = parse_soundscape(&soundscape)?;
    let config = EngineConfig {
        initial_volume: volume,
        audio_root,
        ..Default::default()
    };
    let fade = config.fade_seconds;
    let mut engine = AmbientEngine::new(
        Box::new(nocturne::CpalBackend::new()),
        Arc::new(WallClock::new()),
        config,
    );
    engine.run_driver();
    engine.play(source);
    if !engine.wait_until_running(Duration::from_secs(3)) {
        eprintln!("warning: audio device did not start, playing silently");
    }
    std::thread::sleep(Duration::from_secs_f32(duration));
    engine.stop(true);
    std::thread::sleep(Duration::from_secs_f32(fade + 0.3));
    engine.destroy();
    Ok(())
}

fn cmd_render(
    soundscape: String,
    output: PathBuf,
    duration: f32,
    sample_rate: u32,
    volume: f32,
    seed: Option<u64>,
) -> Result<(), Box<dyn Error>> {
    let source = parse_soundscape(&soundscape)?;
    let config = EngineConfig {
        initial_volume: volume,
        seed,
        ..Default::default()
    };
    let fade = config.fade_seconds;
    let clock = Arc::new(ManualClock::new());
    let engine = AmbientEngine::new(
        Box::new(OfflineBackend::new(sample_rate as f32)),
        clock.clone(),
        config,
    );
    engine.play(source);

    // Drive the clock and the graph together in 50 ms steps, then let the
    // fade-out run to silence before finalizing.
    let graph = engine.graph();
    let step = Duration::from_millis(50);
    let frames_per_step = (sample_rate / 20) as usize;
    let mut buf = vec![0.0f32; frames_per_step * 2];
    let mut samples: Vec<f32> = Vec::new();
    let total = duration + fade + 0.3;
    let steps = (total / 0.05).ceil() as usize;
    let stop_at = (duration / 0.05) as usize;
    for i in 0..steps {
        if i == stop_at {
            engine.stop(true);
        }
        clock.advance(step);
        engine.tick();
        graph.lock().unwrap().render(&mut buf, 2);
        samples.extend_from_slice(&buf);
    }

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&output, spec)?;
    for s in samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * 32767.0) as i16)?;
    }
    writer.finalize()?;
    println!("wrote {} ({:.1} s)", output.display(), total);
    Ok(())
}

fn cmd_list() {
    println!("profiles:");
    for name in PROFILE_NAMES {
        println!("  {name}");
    }
    println!("\nevent kinds:");
    for kind in EVENT_KINDS {
        println!("  {kind}");
    }
    println!("\nthemes (plus \"baby\"):");
    for name in nocturne::loops::theme_names() {
        println!("  {name}");
    }
    println!("\nsoundscape loop presets:");
    for name in nocturne::loops::soundscape_names() {
        println!("  {name}");
    }
    println!("\nmusic loop presets:");
    for name in nocturne::loops::music_loop_names() {
        println!("  {name}");
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Play {
            soundscape,
            duration,
            volume,
            audio_root,
        } => cmd_play(soundscape, duration, volume, audio_root),
        Commands::Render {
            soundscape,
            output,
            duration,
            sample_rate,
            volume,
            seed,
        } => cmd_render(soundscape, output, duration, sample_rate, volume, seed),
        Commands::List => {
            cmd_list();
            Ok(())
        }
    }
}
