//! Sequencer Events
//!
//! Event-based communication for UI synchronization during a session.
//! Events are emitted at key points:
//! - Phase changes (intro/loop/outro/idle)
//! - Countdown ticks
//! - Level samples (only when the value changes)
//! - Loop crossfade start and completion
//!
//! Delivery is synchronous, in registration order, on the thread that
//! called into the sequencer.

use crate::types::{LoopSlot, PlaybackPhase};
use serde::{Deserialize, Serialize};

/// Events emitted by the sequencer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SequencerEvent {
    /// Phase changed
    PhaseChanged {
        /// The new phase
        phase: PlaybackPhase,
    },

    /// Countdown changed
    CountdownTick {
        /// Remaining time in minutes (one tick == 1/60 minute)
        remaining_minutes: f64,
    },

    /// New level sample published
    LevelSample {
        /// Mean spectrum magnitude in 0.0..=1.0
        level: f32,
    },

    /// Loop crossfade started
    CrossfadeStarted {
        /// Slot fading out
        from: LoopSlot,
        /// Slot fading in
        to: LoopSlot,
        /// Duration of the crossfade in milliseconds
        duration_ms: u32,
    },

    /// Loop crossfade completed
    CrossfadeCompleted {
        /// Slot now carrying the loop
        active: LoopSlot,
    },

    /// Outro finished naturally and the session returned to idle
    SessionCompleted,

    /// Backend failed mid-session and the sequencer tore down to idle
    Error {
        /// Error message
        message: String,
    },
}

type PhaseListener = Box<dyn FnMut(PlaybackPhase)>;
type LevelListener = Box<dyn FnMut(f32)>;
type CountdownListener = Box<dyn FnMut(f64)>;
type EventListener = Box<dyn FnMut(&SequencerEvent)>;

/// Registered observers
#[derive(Default)]
pub(crate) struct Listeners {
    phase: Vec<PhaseListener>,
    level: Vec<LevelListener>,
    countdown: Vec<CountdownListener>,
    events: Vec<EventListener>,
}

impl Listeners {
    pub(crate) fn add_phase(&mut self, listener: PhaseListener) {
        self.phase.push(listener);
    }

    pub(crate) fn add_level(&mut self, listener: LevelListener) {
        self.level.push(listener);
    }

    pub(crate) fn add_countdown(&mut self, listener: CountdownListener) {
        self.countdown.push(listener);
    }

    pub(crate) fn add_event(&mut self, listener: EventListener) {
        self.events.push(listener);
    }

    /// Fan an event out to the typed listeners, then to the catch-all ones
    pub(crate) fn emit(&mut self, event: &SequencerEvent) {
        match *event {
            SequencerEvent::PhaseChanged { phase } => {
                for listener in &mut self.phase {
                    listener(phase);
                }
            }
            SequencerEvent::LevelSample { level } => {
                for listener in &mut self.level {
                    listener(level);
                }
            }
            SequencerEvent::CountdownTick { remaining_minutes } => {
                for listener in &mut self.countdown {
                    listener(remaining_minutes);
                }
            }
            _ => {}
        }

        for listener in &mut self.events {
            listener(event);
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("phase", &self.phase.len())
            .field("level", &self.level.len())
            .field("countdown", &self.countdown.len())
            .field("events", &self.events.len())
            .finish()
    }
}
