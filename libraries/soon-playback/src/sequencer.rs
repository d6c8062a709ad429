//! Playback sequencer - core orchestration
//!
//! Chains intro -> loop -> outro against a sleep countdown:
//!
//! ```text
//! idle --start()--> intro --(intro ends)--> loop --(remaining <= threshold)--> outro --(outro ends)--> idle
//! any phase --stop()--> idle
//! ```
//!
//! The sequencer is single-threaded and never blocks. Everything that happens
//! "later" (clip endings, countdown ticks, crossfade completion, level
//! samples) is picked up by [`PlaybackSequencer::poll`], which the host calls
//! at its display cadence.

use crate::{
    backend::AudioBackend,
    clock::{Clock, SystemClock},
    countdown::Countdown,
    crossfade::{CrossfadeOperation, LoopDeck},
    error::{Result, SequencerError},
    events::{Listeners, SequencerEvent},
    meter::LevelMeter,
    timer::{SessionToken, TimerKind, TimerQueue},
    types::{ClipSet, LoopSlot, PlaybackPhase, SequencerConfig, SlotState, Voice},
};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Sleep-sound playback sequencer
///
/// Owns the phase state machine, the two loop slots, the countdown and the
/// level meter for one player. Generic over the audio backend and the clock
/// so hosts can plug in a real engine and tests can drive time by hand.
pub struct PlaybackSequencer<B: AudioBackend, C: Clock = SystemClock> {
    backend: B,
    clock: C,
    clips: ClipSet,
    config: SequencerConfig,

    phase: PlaybackPhase,
    countdown: Countdown,
    deck: LoopDeck,

    // Pending timers and the session they must belong to
    timers: TimerQueue,
    session: SessionToken,

    meter: LevelMeter,
    listeners: Listeners,

    // Last countdown value delivered to listeners
    published_remaining: Duration,
}

impl<B: AudioBackend> PlaybackSequencer<B, SystemClock> {
    /// Create a sequencer on the wall clock
    pub fn new(backend: B, clips: ClipSet, config: SequencerConfig) -> Result<Self> {
        Self::with_clock(backend, clips, config, SystemClock::new())
    }
}

impl<B: AudioBackend, C: Clock> PlaybackSequencer<B, C> {
    /// Create a sequencer on an explicit clock
    ///
    /// The countdown starts configured to `config.default_duration`.
    pub fn with_clock(backend: B, clips: ClipSet, config: SequencerConfig, clock: C) -> Result<Self> {
        config.validate()?;

        let countdown = Countdown::new(config.default_duration);
        Ok(Self {
            backend,
            clock,
            clips,
            meter: LevelMeter::new(config.analysis_bins),
            config,
            phase: PlaybackPhase::Idle,
            published_remaining: countdown.remaining(),
            countdown,
            deck: LoopDeck::new(),
            timers: TimerQueue::new(),
            session: SessionToken::default(),
            listeners: Listeners::default(),
        })
    }

    // ===== Session Control =====

    /// Set the session length
    ///
    /// Only allowed while idle, and only to one of the configured durations.
    /// On rejection the previous configuration is kept.
    pub fn configure(&mut self, duration_minutes: u32) -> Result<()> {
        if self.phase != PlaybackPhase::Idle {
            return Err(SequencerError::config(format!(
                "cannot configure while {}",
                self.phase
            )));
        }

        if !self.config.is_allowed(duration_minutes) {
            return Err(SequencerError::config(format!(
                "duration {duration_minutes} min is not one of {:?}",
                self.config.allowed_durations
            )));
        }

        self.countdown = Countdown::new(duration_minutes);
        debug!(minutes = duration_minutes, "Countdown configured");
        self.publish_countdown();
        Ok(())
    }

    /// Start a session
    ///
    /// Initializes the backend on first use, plays the intro and starts the
    /// countdown. A call while a session is running is ignored. On failure the
    /// sequencer stays idle with nothing playing.
    pub fn start(&mut self) -> Result<()> {
        if self.phase != PlaybackPhase::Idle {
            debug!(phase = %self.phase, "start() ignored, session already running");
            return Ok(());
        }

        if !self.backend.is_initialized() {
            self.backend.initialize(&self.clips).map_err(|err| {
                warn!(error = %err, "Audio backend failed to initialize");
                err.into_unavailable()
            })?;
            debug!("Audio backend initialized");
        }

        self.deck.reset();
        self.apply_rest_gains();
        self.backend.set_gain(Voice::Intro, 1.0);
        self.backend.set_gain(Voice::Outro, 1.0);

        if let Err(err) = self.backend.play(Voice::Intro, Duration::ZERO) {
            warn!(error = %err, "Intro failed to play");
            self.backend.stop_all();
            return Err(err.into_unavailable());
        }

        // A session that ran to completion leaves the countdown at zero
        if self.countdown.is_exhausted() {
            self.countdown.reset();
            self.publish_countdown();
        }

        self.session = self.session.next();
        self.timers.clear();
        let first_tick = self.clock.now() + self.config.tick_interval();
        self.timers
            .schedule(first_tick, TimerKind::CountdownTick, self.session);

        info!(
            minutes = self.countdown.total_minutes(),
            remaining = %self.countdown.display(),
            "Session started"
        );
        self.enter(PlaybackPhase::Intro);
        Ok(())
    }

    /// Stop the session and return to idle
    ///
    /// Valid in any phase; calling it twice is the same as calling it once.
    /// The countdown is refilled to its configured total.
    pub fn stop(&mut self) {
        let was_playing = self.phase.is_playing();

        self.teardown();
        self.countdown.reset();
        self.publish_countdown();

        if was_playing {
            info!("Session stopped");
        }
    }

    /// Drive the sequencer
    ///
    /// Call at the host's display cadence (around 60 Hz). Collects clip-ended
    /// notifications, fires due timers, watches the active loop slot for its
    /// seam and samples the level meter.
    pub fn poll(&mut self) {
        let session = self.session;
        for voice in self.backend.poll_ended() {
            if self.session != session {
                break;
            }
            self.on_clip_ended(voice);
        }

        let now = self.clock.now();
        while let Some(timer) = self.timers.pop_due(now) {
            if timer.session != self.session {
                trace!(kind = ?timer.kind, "Dropping stale timer");
                continue;
            }
            match timer.kind {
                TimerKind::CountdownTick => self.on_tick(timer.deadline),
                TimerKind::CrossfadeComplete => self.finish_crossfade(),
            }
        }

        self.monitor_loop();
        self.sample_level();
    }

    // ===== Subscriptions =====

    /// Called with the new phase on every phase change
    pub fn on_phase_change(&mut self, listener: impl FnMut(PlaybackPhase) + 'static) {
        self.listeners.add_phase(Box::new(listener));
    }

    /// Called with each new level sample (only when it changes)
    pub fn on_level_sample(&mut self, listener: impl FnMut(f32) + 'static) {
        self.listeners.add_level(Box::new(listener));
    }

    /// Called with the remaining minutes whenever the countdown changes
    pub fn on_countdown_tick(&mut self, listener: impl FnMut(f64) + 'static) {
        self.listeners.add_countdown(Box::new(listener));
    }

    /// Called with every event the sequencer emits
    pub fn on_event(&mut self, listener: impl FnMut(&SequencerEvent) + 'static) {
        self.listeners.add_event(Box::new(listener));
    }

    // ===== State Queries =====

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    /// Remaining time in minutes
    pub fn remaining_minutes(&self) -> f64 {
        self.countdown.remaining_minutes()
    }

    /// State of a loop slot, with gains following any crossfade in progress
    pub fn slot(&self, slot: LoopSlot) -> SlotState {
        self.deck.slot_at(slot, self.clock.now())
    }

    pub fn active_slot(&self) -> LoopSlot {
        self.deck.active()
    }

    /// The crossfade in flight, if any
    pub fn crossfade(&self) -> Option<&CrossfadeOperation> {
        self.deck.crossfade()
    }

    /// Last published level
    pub fn level(&self) -> f32 {
        self.meter.level()
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn clips(&self) -> &ClipSet {
        &self.clips
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ===== Phase Handling =====

    /// Guarded phase change
    fn transition(&mut self, next: PlaybackPhase) -> Result<()> {
        if self.phase == next {
            return Ok(());
        }
        if !self.phase.can_transition_to(next) {
            return Err(SequencerError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }

        info!(from = %self.phase, to = %next, "Phase changed");
        self.phase = next;
        self.emit(&SequencerEvent::PhaseChanged { phase: next });
        Ok(())
    }

    /// Phase change where a refusal is an expected race
    fn enter(&mut self, next: PlaybackPhase) {
        if let Err(err) = self.transition(next) {
            debug!(error = %err, "Transition refused");
        }
    }

    fn on_clip_ended(&mut self, voice: Voice) {
        match (voice, self.phase) {
            (Voice::Intro, PlaybackPhase::Intro) => self.enter_loop(),
            (Voice::Loop(slot), PlaybackPhase::Loop) => {
                if slot == self.deck.active() && !self.deck.is_crossfading() {
                    // The seam passed without a crossfade (host stalled)
                    warn!(?slot, "Loop slot ran out, restarting");
                    if let Err(err) = self.backend.play(voice, Duration::ZERO) {
                        self.fail_safe(&err);
                    }
                } else {
                    trace!(?slot, "Outgoing loop slot ended");
                }
            }
            (Voice::Outro, PlaybackPhase::Outro) => self.complete_session(),
            (voice, phase) => debug!(?voice, %phase, "Ignoring clip-ended notice"),
        }
    }

    fn enter_loop(&mut self) {
        if self.countdown.remaining() <= self.config.outro_threshold() {
            debug!(
                remaining = %self.countdown.display(),
                "Intro ended inside the outro window, skipping loop"
            );
            self.cut_to_outro();
            return;
        }

        self.deck.reset();
        self.apply_rest_gains();

        if let Err(err) = self.backend.play(Voice::Loop(LoopSlot::A), Duration::ZERO) {
            self.fail_safe(&err);
            return;
        }
        self.enter(PlaybackPhase::Loop);
    }

    /// Stop the loop and play the outro
    ///
    /// Overrides any crossfade in flight.
    fn cut_to_outro(&mut self) {
        if let Some(op) = self.deck.abandon() {
            self.timers.cancel(TimerKind::CrossfadeComplete);
            debug!(from = ?op.from, to = ?op.to, "Crossfade abandoned for outro");
        }

        self.backend.stop(Voice::Loop(LoopSlot::A));
        self.backend.stop(Voice::Loop(LoopSlot::B));
        self.deck.reset();
        self.apply_rest_gains();

        self.backend.set_gain(Voice::Outro, 1.0);
        if let Err(err) = self.backend.play(Voice::Outro, Duration::ZERO) {
            self.fail_safe(&err);
            return;
        }

        debug!(remaining = %self.countdown.display(), "Cut to outro");
        self.enter(PlaybackPhase::Outro);
    }

    /// Outro finished: end the session with the countdown drained
    fn complete_session(&mut self) {
        self.countdown.exhaust();
        self.publish_countdown();
        self.teardown();
        info!("Session complete");
        self.emit(&SequencerEvent::SessionCompleted);
    }

    /// Backend failed mid-session: tear everything down
    fn fail_safe(&mut self, err: &SequencerError) {
        warn!(error = %err, phase = %self.phase, "Backend failure, returning to idle");
        self.teardown();
        self.countdown.reset();
        self.publish_countdown();
        self.emit(&SequencerEvent::Error {
            message: err.to_string(),
        });
    }

    /// Halt audio, invalidate timers and return to idle
    fn teardown(&mut self) {
        self.session = self.session.next();
        self.timers.clear();
        self.deck.reset();

        if self.backend.is_initialized() {
            self.backend.stop_all();
            self.apply_rest_gains();
        }

        self.enter(PlaybackPhase::Idle);
        self.publish_level(0.0);
    }

    // ===== Countdown =====

    fn on_tick(&mut self, deadline: Duration) {
        let remaining = self.countdown.tick(self.config.tick_interval());
        trace!(remaining = %self.countdown.display(), "Countdown tick");
        self.publish_countdown();

        if self.phase.is_playing() {
            self.timers.schedule(
                deadline + self.config.tick_interval(),
                TimerKind::CountdownTick,
                self.session,
            );
        }

        if self.phase == PlaybackPhase::Loop && remaining <= self.config.outro_threshold() {
            self.cut_to_outro();
        }
    }

    fn publish_countdown(&mut self) {
        let remaining = self.countdown.remaining();
        if remaining == self.published_remaining {
            return;
        }
        self.published_remaining = remaining;
        self.emit(&SequencerEvent::CountdownTick {
            remaining_minutes: self.countdown.remaining_minutes(),
        });
    }

    // ===== Loop Crossfade =====

    /// Trigger a crossfade once the active slot is within one crossfade of its end
    fn monitor_loop(&mut self) {
        if self.phase != PlaybackPhase::Loop || self.deck.is_crossfading() {
            return;
        }

        let voice = Voice::Loop(self.deck.active());
        let Some(length) = self.backend.duration(voice) else {
            return;
        };

        let time_to_end = length.saturating_sub(self.backend.position(voice));
        if time_to_end <= self.config.crossfade_duration() {
            self.begin_crossfade();
        }
    }

    fn begin_crossfade(&mut self) {
        let duration = self.config.crossfade_duration();
        let Some(op) = self.deck.begin(self.clock.now(), duration) else {
            debug!("Crossfade already in flight");
            return;
        };

        let outgoing = Voice::Loop(op.from);
        let incoming = Voice::Loop(op.to);

        self.backend.stop(incoming);
        self.backend.set_gain(incoming, 0.0);
        if let Err(err) = self.backend.play(incoming, Duration::ZERO) {
            self.fail_safe(&err);
            return;
        }
        self.backend.ramp_gain(outgoing, 0.0, duration);
        self.backend.ramp_gain(incoming, 1.0, duration);

        self.timers
            .schedule(op.completes_at(), TimerKind::CrossfadeComplete, self.session);

        debug!(from = ?op.from, to = ?op.to, "Crossfade started");
        self.emit(&SequencerEvent::CrossfadeStarted {
            from: op.from,
            to: op.to,
            duration_ms: self.config.crossfade_ms,
        });
    }

    fn finish_crossfade(&mut self) {
        let Some(op) = self.deck.complete() else {
            return;
        };

        let outgoing = Voice::Loop(op.from);
        let incoming = Voice::Loop(op.to);

        self.backend.stop(outgoing);
        self.backend.set_gain(outgoing, 0.0);
        self.backend.set_gain(incoming, 1.0);

        debug!(active = ?op.to, "Crossfade complete");
        self.emit(&SequencerEvent::CrossfadeCompleted { active: op.to });
    }

    /// Slot gains at rest: A full, B silent
    fn apply_rest_gains(&mut self) {
        self.backend.set_gain(Voice::Loop(LoopSlot::A), 1.0);
        self.backend.set_gain(Voice::Loop(LoopSlot::B), 0.0);
    }

    // ===== Metering =====

    fn sample_level(&mut self) {
        let level = if self.phase.is_playing() && self.backend.is_initialized() {
            self.meter.sample(&mut self.backend)
        } else {
            0.0
        };
        self.publish_level(level);
    }

    fn publish_level(&mut self, level: f32) {
        if self.meter.publish(level) {
            self.emit(&SequencerEvent::LevelSample {
                level: self.meter.level(),
            });
        }
    }

    fn emit(&mut self, event: &SequencerEvent) {
        self.listeners.emit(event);
    }
}

impl<B: AudioBackend, C: Clock> std::fmt::Debug for PlaybackSequencer<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSequencer")
            .field("phase", &self.phase)
            .field("countdown", &self.countdown)
            .field("deck", &self.deck)
            .field("session", &self.session)
            .field("timers", &self.timers.len())
            .field("level", &self.meter.level())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{BackendCall, FakeBackend};

    fn sequencer() -> (PlaybackSequencer<FakeBackend, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let backend = FakeBackend::new(clock.clone());
        let seq = PlaybackSequencer::with_clock(
            backend,
            ClipSet::new("intro.mp3", "loop.mp3", "outro.mp3"),
            SequencerConfig::default(),
            clock.clone(),
        )
        .unwrap();
        (seq, clock)
    }

    #[test]
    fn starts_idle_with_default_duration() {
        let (seq, _) = sequencer();
        assert_eq!(seq.phase(), PlaybackPhase::Idle);
        assert_eq!(seq.remaining_minutes(), 30.0);
        assert_eq!(seq.active_slot(), LoopSlot::A);
        assert!(!seq.backend().is_initialized());
    }

    #[test]
    fn rejects_invalid_config() {
        let clock = ManualClock::new();
        let config = SequencerConfig {
            allowed_durations: vec![],
            ..Default::default()
        };
        let result = PlaybackSequencer::with_clock(
            FakeBackend::new(clock.clone()),
            ClipSet::new("a", "b", "c"),
            config,
            clock,
        );
        assert!(matches!(
            result,
            Err(SequencerError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn start_plays_intro_and_initializes_once() {
        let (mut seq, _) = sequencer();
        seq.start().unwrap();
        assert_eq!(seq.phase(), PlaybackPhase::Intro);
        assert!(seq.backend().is_playing(Voice::Intro));

        seq.stop();
        seq.start().unwrap();
        assert_eq!(seq.backend().initialize_attempts(), 1);
    }

    #[test]
    fn start_while_running_is_ignored() {
        let (mut seq, _) = sequencer();
        seq.start().unwrap();
        let plays = seq.backend().count(|c| matches!(c, BackendCall::Play(..)));

        seq.start().unwrap();
        assert_eq!(seq.phase(), PlaybackPhase::Intro);
        assert_eq!(
            seq.backend().count(|c| matches!(c, BackendCall::Play(..))),
            plays
        );
    }

    #[test]
    fn configure_outside_idle_is_rejected() {
        let (mut seq, _) = sequencer();
        seq.start().unwrap();
        let err = seq.configure(45).unwrap_err();
        assert!(matches!(err, SequencerError::InvalidConfiguration(_)));
        assert_eq!(seq.countdown().total_minutes(), 30);
    }

    #[test]
    fn stale_timers_are_dropped() {
        let (mut seq, clock) = sequencer();
        seq.start().unwrap();
        seq.stop();
        seq.start().unwrap();

        clock.advance(Duration::from_secs(1));
        seq.poll();
        // One tick from the live session only
        assert_eq!(seq.countdown().remaining(), Duration::from_secs(30 * 60 - 1));
    }
}
