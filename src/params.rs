//! The `musicParams` data contract.
//!
//! Story pages describe their soundtrack as a JSON parameter bag rather
//! than naming a built-in profile. Field names are camelCase on the wire
//! (`padType`, `chordNotes`, `melodyInterval`); events use `type` for the
//! kind. Everything is optional; unset fields fall back to the defaults
//! below, and the melodic layers derive from the chord when not given
//! explicitly (melody an octave up, bass an octave down, counter a major
//! third above the melody).

use crate::noise::NoiseColor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PadType {
    Fm,
    #[default]
    Chorus,
    Resonant,
    Plucked,
    Simple,
}

/// One recurring atmospheric event, e.g. `{"type": "owl", "interval": 15000}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSpec {
    #[serde(rename = "type")]
    pub kind: String,
    /// Base interval between firings, in milliseconds.
    pub interval: u64,
    /// Gain multiplier on the event's built-in level.
    pub gain: f32,
}

impl Default for EventSpec {
    fn default() -> Self {
        Self {
            kind: String::new(),
            interval: 10_000,
            gain: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MusicParams {
    pub pad_type: PadType,
    /// Chord frequencies in Hz. The harmonic anchor everything else
    /// derives from.
    pub chord_notes: Vec<f32>,
    pub pad_gain: f32,
    /// Pad lowpass cutoff in Hz.
    pub pad_filter: f32,
    /// Pad filter LFO rate in Hz.
    pub pad_lfo: f32,
    pub noise_type: NoiseColor,
    pub noise_gain: f32,
    /// Defaults to half the chord root.
    pub drone_freq: Option<f32>,
    pub drone_gain: f32,
    /// Defaults to the chord an octave up.
    pub melody_notes: Option<Vec<f32>>,
    pub melody_interval: u64,
    pub melody_gain: f32,
    /// Defaults to the chord an octave down.
    pub bass_notes: Option<Vec<f32>>,
    pub bass_interval: u64,
    /// Defaults to the melody notes a major third up.
    pub counter_notes: Option<Vec<f32>>,
    pub counter_interval: u64,
    pub events: Vec<EventSpec>,
    /// Layer a preset soundscape loop under the synths.
    pub soundscape_preset: Option<String>,
    /// Layer a preset music loop under the synths.
    pub music_loop: Option<String>,
}

impl Default for MusicParams {
    fn default() -> Self {
        Self {
            pad_type: PadType::default(),
            chord_notes: vec![130.81, 164.81, 196.0, 261.63],
            pad_gain: 0.045,
            pad_filter: 800.0,
            pad_lfo: 0.06,
            noise_type: NoiseColor::Pink,
            noise_gain: 0.01,
            drone_freq: None,
            drone_gain: 0.035,
            melody_notes: None,
            melody_interval: 3_500,
            melody_gain: 0.018,
            bass_notes: None,
            bass_interval: 6_000,
            counter_notes: None,
            counter_interval: 4_500,
            events: Vec::new(),
            soundscape_preset: None,
            music_loop: None,
        }
    }
}

impl MusicParams {
    pub fn melody_notes(&self) -> Vec<f32> {
        match &self.melody_notes {
            Some(n) => n.clone(),
            None => self.chord_notes.iter().map(|f| f * 2.0).collect(),
        }
    }

    pub fn bass_notes(&self) -> Vec<f32> {
        match &self.bass_notes {
            Some(n) => n.clone(),
            // At most four bass notes even for wide chords.
            None => self.chord_notes.iter().take(4).map(|f| f / 2.0).collect(),
        }
    }

    pub fn counter_notes(&self) -> Vec<f32> {
        match &self.counter_notes {
            Some(n) => n.clone(),
            None => self.melody_notes().iter().map(|f| f * 1.25).collect(),
        }
    }

    pub fn drone_freq(&self) -> f32 {
        self.drone_freq
            .unwrap_or_else(|| self.chord_notes.first().copied().unwrap_or(220.0) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_fills_defaults() {
        let p: MusicParams = serde_json::from_str(r#"{"chordNotes": [220, 277, 329]}"#).unwrap();
        assert_eq!(p.chord_notes, vec![220.0, 277.0, 329.0]);
        assert_eq!(p.pad_type, PadType::Chorus);
        assert_eq!(p.melody_interval, 3_500);
        assert_eq!(p.melody_notes(), vec![440.0, 554.0, 658.0]);
        assert_eq!(p.bass_notes(), vec![110.0, 138.5, 164.5]);
        assert_eq!(p.drone_freq(), 110.0);
    }

    #[test]
    fn default_chord_is_c_major_low() {
        let p = MusicParams::default();
        assert_eq!(p.chord_notes, vec![130.81, 164.81, 196.0, 261.63]);
        assert_eq!(p.drone_freq(), 130.81 / 2.0);
    }

    #[test]
    fn bass_derivation_caps_at_four_notes() {
        let p = MusicParams {
            chord_notes: vec![100.0, 200.0, 300.0, 400.0, 500.0, 600.0],
            ..Default::default()
        };
        assert_eq!(p.bass_notes(), vec![50.0, 100.0, 150.0, 200.0]);
    }

    #[test]
    fn counter_derives_from_melody() {
        let p = MusicParams {
            chord_notes: vec![200.0],
            ..Default::default()
        };
        assert_eq!(p.counter_notes(), vec![500.0]);
    }

    #[test]
    fn camel_case_and_event_type_field() {
        let p: MusicParams = serde_json::from_str(
            r#"{
                "padType": "resonant",
                "chordNotes": [110],
                "melodyInterval": 5000,
                "noiseType": "brown",
                "events": [{"type": "owl", "interval": 15000}, {"type": "cricket"}]
            }"#,
        )
        .unwrap();
        assert_eq!(p.pad_type, PadType::Resonant);
        assert_eq!(p.melody_interval, 5_000);
        assert_eq!(p.noise_type, NoiseColor::Brown);
        assert_eq!(p.events.len(), 2);
        assert_eq!(p.events[0].kind, "owl");
        assert_eq!(p.events[0].interval, 15_000);
        assert_eq!(p.events[1].interval, 10_000);
        assert_eq!(p.events[1].gain, 1.0);
    }

    #[test]
    fn explicit_layers_override_derivation() {
        let p = MusicParams {
            chord_notes: vec![220.0],
            melody_notes: Some(vec![880.0]),
            bass_notes: Some(vec![55.0]),
            counter_notes: Some(vec![660.0]),
            drone_freq: Some(72.0),
            ..Default::default()
        };
        assert_eq!(p.melody_notes(), vec![880.0]);
        assert_eq!(p.bass_notes(), vec![55.0]);
        assert_eq!(p.counter_notes(), vec![660.0]);
        assert_eq!(p.drone_freq(), 72.0);
    }
}
