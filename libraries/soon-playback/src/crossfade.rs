//! Loop crossfade bookkeeping
//!
//! The loop body plays on two slots bound to the same clip. Shortly before the
//! active slot runs out, the other slot starts from the top at zero gain and
//! the two are cross-faded so the seam is never heard:
//!
//! ```text
//!   gain
//!   1.0 ─────────╲            ╱─────────  slot B
//!                 ╲          ╱
//!                  ╲        ╱
//!                   ╲      ╱
//!   0.0 ─────────────╳────╳─────────────  slot A
//!              |<-- crossfade -->|
//! ```
//!
//! Ramps are linear, so the two gains sum to 1.0 at every instant. The ramps
//! themselves run in the audio engine; this module tracks what the sequencer
//! scheduled so it can report slot state and enforce one crossfade at a time.

use crate::types::{LoopSlot, SlotState};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A crossfade in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossfadeOperation {
    /// Slot fading out
    pub from: LoopSlot,

    /// Slot fading in
    pub to: LoopSlot,

    /// Clock time the ramps started
    pub started_at: Duration,

    /// Ramp length
    pub duration: Duration,
}

impl CrossfadeOperation {
    pub fn new(from: LoopSlot, started_at: Duration, duration: Duration) -> Self {
        Self {
            from,
            to: from.other(),
            started_at,
            duration,
        }
    }

    /// Clock time the ramps end
    pub fn completes_at(&self) -> Duration {
        self.started_at + self.duration
    }

    /// Normalized progress (0.0 = just started, 1.0 = complete)
    pub fn progress(&self, now: Duration) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_sub(self.started_at);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0) as f32
    }

    /// Linear gains `(from, to)` at `now`
    #[inline]
    pub fn gains_at(&self, now: Duration) -> (f32, f32) {
        let t = self.progress(now);
        (1.0 - t, t)
    }
}

/// The two loop slots and the crossfade between them
#[derive(Debug, Clone)]
pub struct LoopDeck {
    /// Gain each slot settles at outside a crossfade
    gains: [f32; 2],

    /// Slot currently carrying the loop
    active: LoopSlot,

    /// Crossfade in progress (at most one)
    crossfade: Option<CrossfadeOperation>,
}

impl Default for LoopDeck {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopDeck {
    /// Deck in the rest configuration: A active at full gain, B silent
    pub fn new() -> Self {
        Self {
            gains: [1.0, 0.0],
            active: LoopSlot::A,
            crossfade: None,
        }
    }

    /// Back to the rest configuration, dropping any crossfade
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn active(&self) -> LoopSlot {
        self.active
    }

    /// Crossfade in flight, if any
    pub fn crossfade(&self) -> Option<&CrossfadeOperation> {
        self.crossfade.as_ref()
    }

    pub fn is_crossfading(&self) -> bool {
        self.crossfade.is_some()
    }

    /// Begin a crossfade away from the active slot
    ///
    /// Returns `None` (and changes nothing) if one is already in flight.
    pub fn begin(&mut self, now: Duration, duration: Duration) -> Option<CrossfadeOperation> {
        if self.crossfade.is_some() {
            return None;
        }
        let operation = CrossfadeOperation::new(self.active, now, duration);
        self.crossfade = Some(operation);
        Some(operation)
    }

    /// Finish the in-flight crossfade
    ///
    /// The incoming slot becomes active at gain 1.0 and the outgoing slot is
    /// pinned to 0.0. Returns the finished operation.
    pub fn complete(&mut self) -> Option<CrossfadeOperation> {
        let operation = self.crossfade.take()?;
        self.active = operation.to;
        self.gains[operation.to.index()] = 1.0;
        self.gains[operation.from.index()] = 0.0;
        Some(operation)
    }

    /// Drop the in-flight crossfade without completing it
    pub fn abandon(&mut self) -> Option<CrossfadeOperation> {
        self.crossfade.take()
    }

    /// Gain of `slot` at `now`, following any ramp in progress
    pub fn gain_at(&self, slot: LoopSlot, now: Duration) -> f32 {
        match &self.crossfade {
            Some(op) => {
                let (from_gain, to_gain) = op.gains_at(now);
                if slot == op.from {
                    from_gain
                } else {
                    to_gain
                }
            }
            None => self.gains[slot.index()],
        }
    }

    /// Observable state of `slot` at `now`
    pub fn slot_at(&self, slot: LoopSlot, now: Duration) -> SlotState {
        SlotState {
            is_active: slot == self.active,
            gain: self.gain_at(slot, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn rest_configuration() {
        let deck = LoopDeck::new();
        assert_eq!(deck.active(), LoopSlot::A);
        assert_eq!(deck.gain_at(LoopSlot::A, ms(0)), 1.0);
        assert_eq!(deck.gain_at(LoopSlot::B, ms(0)), 0.0);
        assert!(!deck.is_crossfading());
    }

    #[test]
    fn linear_gains_sum_to_one() {
        let op = CrossfadeOperation::new(LoopSlot::A, ms(1000), ms(2000));
        assert_eq!(op.to, LoopSlot::B);
        assert_eq!(op.completes_at(), ms(3000));

        for t in (1000..=3000).step_by(100) {
            let (from, to) = op.gains_at(ms(t));
            assert!((from + to - 1.0).abs() < 1e-6, "sum drifted at {t}ms");
        }

        assert_eq!(op.gains_at(ms(1000)), (1.0, 0.0));
        assert_eq!(op.gains_at(ms(2000)), (0.5, 0.5));
        assert_eq!(op.gains_at(ms(3000)), (0.0, 1.0));
        assert_eq!(op.gains_at(ms(9000)), (0.0, 1.0));
    }

    #[test]
    fn second_begin_is_ignored() {
        let mut deck = LoopDeck::new();
        let first = deck.begin(ms(0), ms(2000));
        assert!(first.is_some());

        let second = deck.begin(ms(500), ms(2000));
        assert!(second.is_none());
        assert_eq!(deck.crossfade().map(|op| op.started_at), Some(ms(0)));
    }

    #[test]
    fn complete_swaps_active_and_pins_gains() {
        let mut deck = LoopDeck::new();
        deck.begin(ms(0), ms(2000));

        // Mid-flight both slots are partially audible
        assert_eq!(deck.gain_at(LoopSlot::A, ms(1000)), 0.5);
        assert_eq!(deck.gain_at(LoopSlot::B, ms(1000)), 0.5);

        let done = deck.complete().unwrap();
        assert_eq!(done.from, LoopSlot::A);
        assert_eq!(deck.active(), LoopSlot::B);
        assert_eq!(deck.gain_at(LoopSlot::B, ms(2000)), 1.0);
        assert_eq!(deck.gain_at(LoopSlot::A, ms(2000)), 0.0);
        assert!(deck.complete().is_none());

        // Next crossfade goes back the other way
        let op = deck.begin(ms(5000), ms(2000)).unwrap();
        assert_eq!(op.from, LoopSlot::B);
        assert_eq!(op.to, LoopSlot::A);
    }

    #[test]
    fn abandon_and_reset() {
        let mut deck = LoopDeck::new();
        deck.begin(ms(0), ms(2000));
        deck.complete();
        deck.begin(ms(4000), ms(2000));

        assert!(deck.abandon().is_some());
        assert!(!deck.is_crossfading());

        deck.reset();
        assert_eq!(deck.active(), LoopSlot::A);
        assert_eq!(deck.slot_at(LoopSlot::A, ms(0)).gain, 1.0);
        assert!(!deck.slot_at(LoopSlot::B, ms(0)).is_active);
    }
}
