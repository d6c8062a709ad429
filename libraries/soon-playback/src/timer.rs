//! Session-scoped timers
//!
//! Timers are plain deadlines drained by the sequencer's `poll()`. Each one
//! carries the session token it was scheduled under; a timer whose token no
//! longer matches the sequencer's current session is dropped unseen, so a
//! `stop()` invalidates everything scheduled before it even if the timer
//! itself was never removed.

use std::time::Duration;

/// Identifies one playback session (`start()` .. teardown)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SessionToken(u64);

impl SessionToken {
    /// The token that follows this one
    #[must_use]
    pub fn next(self) -> Self {
        SessionToken(self.0.wrapping_add(1))
    }
}

/// What a timer does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Decrement the countdown
    CountdownTick,

    /// Finish the in-flight loop crossfade
    CrossfadeComplete,
}

/// A scheduled deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub deadline: Duration,
    pub kind: TimerKind,
    pub session: SessionToken,
    seq: u64,
}

/// Pending timers, fired in deadline order (ties in scheduling order)
#[derive(Debug, Default)]
pub struct TimerQueue {
    timers: Vec<Timer>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a timer
    pub fn schedule(&mut self, deadline: Duration, kind: TimerKind, session: SessionToken) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.timers.push(Timer {
            deadline,
            kind,
            session,
            seq,
        });
    }

    /// Remove every pending timer of `kind`. Returns how many were removed.
    pub fn cancel(&mut self, kind: TimerKind) -> usize {
        let before = self.timers.len();
        self.timers.retain(|t| t.kind != kind);
        before - self.timers.len()
    }

    /// Remove all pending timers
    pub fn clear(&mut self) {
        self.timers.clear();
    }

    /// Take the earliest timer due at `now`, if any
    pub fn pop_due(&mut self, now: Duration) -> Option<Timer> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline <= now)
            .min_by_key(|(_, t)| (t.deadline, t.seq))
            .map(|(i, _)| i)?;

        Some(self.timers.swap_remove(index))
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.iter().map(|t| t.deadline).min()
    }

    /// Whether a timer of `kind` is pending
    pub fn contains(&self, kind: TimerKind) -> bool {
        self.timers.iter().any(|t| t.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
