//! Core types for playback sequencing

use crate::error::{Result, SequencerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Sleep durations offered by the dial, in minutes
pub const DEFAULT_DURATIONS: [u32; 5] = [15, 30, 45, 60, 90];

/// Playback phase
///
/// Exactly one phase is active at a time. A session walks
/// `Idle -> Intro -> Loop -> Outro -> Idle`; `stop()` returns to `Idle` from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPhase {
    /// Nothing audible, countdown at rest
    #[default]
    Idle,

    /// Intro clip playing from the top
    Intro,

    /// Loop body playing on alternating slots
    Loop,

    /// Outro clip playing; session ends with it
    Outro,
}

impl PlaybackPhase {
    /// Whether audio is (or may be) audible in this phase
    pub fn is_playing(self) -> bool {
        self != PlaybackPhase::Idle
    }

    /// Whether the state machine permits moving from `self` to `next`
    ///
    /// Any phase may return to `Idle`. `Intro -> Outro` covers a countdown that
    /// already crossed the outro threshold before the intro finished.
    pub fn can_transition_to(self, next: PlaybackPhase) -> bool {
        matches!(
            (self, next),
            (_, PlaybackPhase::Idle)
                | (PlaybackPhase::Idle, PlaybackPhase::Intro)
                | (PlaybackPhase::Intro, PlaybackPhase::Loop)
                | (PlaybackPhase::Intro | PlaybackPhase::Loop, PlaybackPhase::Outro)
        )
    }
}

impl fmt::Display for PlaybackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackPhase::Idle => "idle",
            PlaybackPhase::Intro => "intro",
            PlaybackPhase::Loop => "loop",
            PlaybackPhase::Outro => "outro",
        };
        f.write_str(name)
    }
}

/// One of the two interchangeable loop buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopSlot {
    A,
    B,
}

impl LoopSlot {
    /// The opposite slot
    pub fn other(self) -> LoopSlot {
        match self {
            LoopSlot::A => LoopSlot::B,
            LoopSlot::B => LoopSlot::A,
        }
    }

    /// Array index for per-slot storage
    pub(crate) fn index(self) -> usize {
        match self {
            LoopSlot::A => 0,
            LoopSlot::B => 1,
        }
    }
}

/// Observable state of a loop slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotState {
    /// Whether this slot currently carries the loop
    pub is_active: bool,

    /// Gain in 0.0..=1.0
    pub gain: f32,
}

/// Audio handle addressed by the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Voice {
    Intro,
    Loop(LoopSlot),
    Outro,
}

impl Voice {
    /// All voices in mixer order
    pub const ALL: [Voice; 4] = [
        Voice::Intro,
        Voice::Loop(LoopSlot::A),
        Voice::Loop(LoopSlot::B),
        Voice::Outro,
    ];

    /// Stable index into per-voice arrays (matches `Voice::ALL`)
    pub fn index(self) -> usize {
        match self {
            Voice::Intro => 0,
            Voice::Loop(LoopSlot::A) => 1,
            Voice::Loop(LoopSlot::B) => 2,
            Voice::Outro => 3,
        }
    }
}

/// The three clips a session is built from
///
/// Both loop slots are bound to the same `loop_clip`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipSet {
    pub intro: PathBuf,
    #[serde(rename = "loop")]
    pub loop_clip: PathBuf,
    pub outro: PathBuf,
}

impl ClipSet {
    /// Create a clip set from three paths
    pub fn new(
        intro: impl Into<PathBuf>,
        loop_clip: impl Into<PathBuf>,
        outro: impl Into<PathBuf>,
    ) -> Self {
        Self {
            intro: intro.into(),
            loop_clip: loop_clip.into(),
            outro: outro.into(),
        }
    }
}

/// Configuration for the playback sequencer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Loop crossfade length in milliseconds (default: 2000)
    pub crossfade_ms: u32,

    /// Countdown left for the outro, in seconds (default: 10)
    pub outro_threshold_secs: u32,

    /// Countdown tick period in milliseconds (default: 1000)
    pub tick_interval_ms: u32,

    /// Durations the dial offers, in minutes
    pub allowed_durations: Vec<u32>,

    /// Duration configured at construction (default: 30)
    pub default_duration: u32,

    /// Frequency bins read per level sample (default: 128)
    pub analysis_bins: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            crossfade_ms: 2000,
            outro_threshold_secs: 10,
            tick_interval_ms: 1000,
            allowed_durations: DEFAULT_DURATIONS.to_vec(),
            default_duration: 30,
            analysis_bins: 128,
        }
    }
}

impl SequencerConfig {
    pub fn crossfade_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.crossfade_ms))
    }

    pub fn outro_threshold(&self) -> Duration {
        Duration::from_secs(u64::from(self.outro_threshold_secs))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.tick_interval_ms))
    }

    /// Whether `minutes` is one of the dial positions
    pub fn is_allowed(&self, minutes: u32) -> bool {
        self.allowed_durations.contains(&minutes)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(SequencerError::config("tick interval must be non-zero"));
        }

        if self.crossfade_ms == 0 {
            return Err(SequencerError::config("crossfade duration must be non-zero"));
        }

        if self.analysis_bins == 0 {
            return Err(SequencerError::config("analysis bins must be non-zero"));
        }

        let Some(&shortest) = self.allowed_durations.iter().min() else {
            return Err(SequencerError::config("allowed durations are empty"));
        };

        if shortest == 0 {
            return Err(SequencerError::config("allowed durations must be non-zero"));
        }

        if !self.is_allowed(self.default_duration) {
            return Err(SequencerError::config(format!(
                "default duration {} is not in {:?}",
                self.default_duration, self.allowed_durations
            )));
        }

        if u64::from(self.outro_threshold_secs) >= u64::from(shortest) * 60 {
            return Err(SequencerError::config(format!(
                "outro threshold {}s must be shorter than the shortest duration ({} min)",
                self.outro_threshold_secs, shortest
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SequencerConfig::default();
        assert_eq!(config.crossfade_duration(), Duration::from_secs(2));
        assert_eq!(config.outro_threshold(), Duration::from_secs(10));
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.allowed_durations, vec![15, 30, 45, 60, 90]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_settings() {
        let config = SequencerConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SequencerConfig {
            allowed_durations: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SequencerConfig {
            default_duration: 20,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        // Threshold eats the whole shortest session
        let config = SequencerConfig {
            outro_threshold_secs: 15 * 60,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn phase_transitions() {
        use PlaybackPhase::*;

        assert!(Idle.can_transition_to(Intro));
        assert!(Intro.can_transition_to(Loop));
        assert!(Intro.can_transition_to(Outro));
        assert!(Loop.can_transition_to(Outro));
        assert!(Outro.can_transition_to(Idle));
        assert!(Loop.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(Loop));
        assert!(!Idle.can_transition_to(Outro));
        assert!(!Loop.can_transition_to(Intro));
        assert!(!Outro.can_transition_to(Loop));
    }

    #[test]
    fn voice_indices_match_all() {
        for (i, voice) in Voice::ALL.iter().enumerate() {
            assert_eq!(voice.index(), i);
        }
        assert_eq!(LoopSlot::A.other(), LoopSlot::B);
        assert_eq!(LoopSlot::B.other(), LoopSlot::A);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: SequencerConfig =
            serde_json::from_str(r#"{ "crossfade_ms": 1500 }"#).unwrap();
        assert_eq!(config.crossfade_ms, 1500);
        assert_eq!(config.outro_threshold_secs, 10);
        assert_eq!(config.default_duration, 30);
    }
}
