//! So-On - Playback Sequencing
//!
//! Platform-agnostic sleep-sound sequencing for the So-On deck.
//!
//! This crate provides:
//! - Intro -> loop -> outro phase state machine
//! - Seamless looping on two alternating slots with linear crossfades
//! - Sleep countdown that cuts to the outro near the end
//! - Level metering (mean spectrum magnitude) and VU needle ballistics
//! - Duration dial over the allowed session lengths
//! - Event listeners for phase, countdown and level changes
//!
//! # Architecture
//!
//! `soon-playback` does no audio I/O:
//! - No dependency on CPAL (desktop audio)
//! - No dependency on a decoder
//! - Time comes from a [`Clock`], audio from an [`AudioBackend`]
//!
//! Platform-specific code (output stream, clip decoding, FFT) is provided
//! through the [`AudioBackend`] trait.
//!
//! # Example: One Session
//!
//! ```rust
//! use soon_playback::testing::FakeBackend;
//! use soon_playback::{ClipSet, ManualClock, PlaybackPhase, PlaybackSequencer, SequencerConfig};
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let backend = FakeBackend::new(clock.clone());
//! let clips = ClipSet::new("intro.mp3", "loop.mp3", "outro.mp3");
//!
//! let mut sequencer =
//!     PlaybackSequencer::with_clock(backend, clips, SequencerConfig::default(), clock.clone())?;
//!
//! sequencer.on_phase_change(|phase| println!("phase: {phase}"));
//! sequencer.configure(15)?;
//! sequencer.start()?;
//! assert_eq!(sequencer.phase(), PlaybackPhase::Intro);
//!
//! // Host loop
//! for _ in 0..600 {
//!     clock.advance(Duration::from_millis(16));
//!     sequencer.poll();
//! }
//! assert_eq!(sequencer.phase(), PlaybackPhase::Loop);
//!
//! sequencer.stop();
//! assert_eq!(sequencer.remaining_minutes(), 15.0);
//! # Ok::<(), soon_playback::SequencerError>(())
//! ```

mod backend;
mod clock;
mod countdown;
mod crossfade;
mod dial;
mod error;
mod events;
mod meter;
mod sequencer;
pub mod testing;
mod timer;
pub mod types;

// Public exports
pub use backend::AudioBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use countdown::Countdown;
pub use crossfade::{CrossfadeOperation, LoopDeck};
pub use dial::DurationDial;
pub use error::{Result, SequencerError};
pub use events::SequencerEvent;
pub use meter::{mean_magnitude, LevelMeter, NeedleBallistics};
pub use sequencer::PlaybackSequencer;
pub use timer::{SessionToken, TimerKind};
pub use types::{
    ClipSet, LoopSlot, PlaybackPhase, SequencerConfig, SlotState, Voice, DEFAULT_DURATIONS,
};
