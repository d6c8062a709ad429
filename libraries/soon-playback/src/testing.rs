//! Test doubles
//!
//! [`FakeBackend`] simulates the audio engine on a [`ManualClock`]: voices
//! advance with the clock, reach the end of their clip and report it, and
//! gain ramps interpolate linearly. Every call is logged with the clock time
//! it was made at, so tests can assert on what the sequencer asked for.

use crate::backend::AudioBackend;
use crate::clock::{Clock, ManualClock};
use crate::error::{Result, SequencerError};
use crate::types::{ClipSet, Voice};
use std::time::Duration;

/// A call made on [`FakeBackend`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendCall {
    Initialize,
    Play(Voice, Duration),
    Stop(Voice),
    StopAll,
    SetGain(Voice, f32),
    RampGain(Voice, f32, Duration),
}

impl BackendCall {
    /// Whether the call changes a voice's gain
    pub fn is_gain_change(&self) -> bool {
        matches!(self, BackendCall::SetGain(..) | BackendCall::RampGain(..))
    }
}

#[derive(Debug, Clone, Copy)]
struct Ramp {
    from: f32,
    to: f32,
    started_at: Duration,
    over: Duration,
}

impl Ramp {
    fn gain_at(&self, now: Duration) -> f32 {
        if self.over.is_zero() {
            return self.to;
        }
        let t = (now.saturating_sub(self.started_at).as_secs_f64() / self.over.as_secs_f64())
            .clamp(0.0, 1.0) as f32;
        self.from + (self.to - self.from) * t
    }
}

#[derive(Debug, Clone, Copy)]
struct FakeVoice {
    playing: bool,
    started_at: Duration,
    offset: Duration,
    gain: f32,
    ramp: Option<Ramp>,
}

impl Default for FakeVoice {
    fn default() -> Self {
        Self {
            playing: false,
            started_at: Duration::ZERO,
            offset: Duration::ZERO,
            gain: 1.0,
            ramp: None,
        }
    }
}

/// Clock-driven audio engine double
#[derive(Debug)]
pub struct FakeBackend {
    clock: ManualClock,
    lengths: [Duration; 4],
    voices: [FakeVoice; 4],
    initialized: bool,
    initialize_attempts: usize,
    fail_initialize: bool,
    fail_play: [bool; 4],
    spectrum: Vec<f32>,
    analysis_reads: usize,
    calls: Vec<(Duration, BackendCall)>,
}

impl FakeBackend {
    /// Intro 5 s, loop 20 s, outro 8 s
    pub fn new(clock: ManualClock) -> Self {
        Self::with_lengths(
            clock,
            Duration::from_secs(5),
            Duration::from_secs(20),
            Duration::from_secs(8),
        )
    }

    pub fn with_lengths(clock: ManualClock, intro: Duration, loop_clip: Duration, outro: Duration) -> Self {
        Self {
            clock,
            lengths: [intro, loop_clip, loop_clip, outro],
            voices: [FakeVoice::default(); 4],
            initialized: false,
            initialize_attempts: 0,
            fail_initialize: false,
            fail_play: [false; 4],
            spectrum: Vec::new(),
            analysis_reads: 0,
            calls: Vec::new(),
        }
    }

    /// Make `initialize` fail until cleared
    pub fn set_fail_initialize(&mut self, fail: bool) {
        self.fail_initialize = fail;
    }

    /// Make `play` fail for `voice` until cleared
    pub fn set_fail_play(&mut self, voice: Voice, fail: bool) {
        self.fail_play[voice.index()] = fail;
    }

    /// Spectrum returned by `frequency_data`
    pub fn set_spectrum(&mut self, bins: Vec<f32>) {
        self.spectrum = bins;
    }

    pub fn is_playing(&self, voice: Voice) -> bool {
        self.voices[voice.index()].playing
    }

    /// Gain of `voice` right now, following any ramp
    pub fn gain(&self, voice: Voice) -> f32 {
        let state = &self.voices[voice.index()];
        match state.ramp {
            Some(ramp) => ramp.gain_at(self.clock.now()),
            None => state.gain,
        }
    }

    pub fn initialize_attempts(&self) -> usize {
        self.initialize_attempts
    }

    /// How many times the analyser was read
    pub fn analysis_reads(&self) -> usize {
        self.analysis_reads
    }

    /// Every call so far, with the clock time it was made at
    pub fn calls(&self) -> &[(Duration, BackendCall)] {
        &self.calls
    }

    /// Number of logged calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.iter().filter(|(_, call)| predicate(call)).count()
    }

    fn record(&mut self, call: BackendCall) {
        self.calls.push((self.clock.now(), call));
    }

    fn halt(&mut self, voice: Voice) {
        let state = &mut self.voices[voice.index()];
        state.playing = false;
        state.offset = Duration::ZERO;
    }
}

impl AudioBackend for FakeBackend {
    fn initialize(&mut self, _clips: &ClipSet) -> Result<()> {
        self.initialize_attempts += 1;
        self.record(BackendCall::Initialize);
        if self.fail_initialize {
            return Err(SequencerError::audio("no output device"));
        }
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn play(&mut self, voice: Voice, from: Duration) -> Result<()> {
        self.record(BackendCall::Play(voice, from));
        if self.fail_play[voice.index()] {
            return Err(SequencerError::audio(format!("{voice:?} failed to play")));
        }
        let now = self.clock.now();
        let state = &mut self.voices[voice.index()];
        state.playing = true;
        state.started_at = now;
        state.offset = from;
        Ok(())
    }

    fn stop(&mut self, voice: Voice) {
        self.record(BackendCall::Stop(voice));
        self.halt(voice);
    }

    fn stop_all(&mut self) {
        self.record(BackendCall::StopAll);
        for voice in Voice::ALL {
            self.halt(voice);
        }
    }

    fn set_gain(&mut self, voice: Voice, gain: f32) {
        self.record(BackendCall::SetGain(voice, gain));
        let state = &mut self.voices[voice.index()];
        state.gain = gain;
        state.ramp = None;
    }

    fn ramp_gain(&mut self, voice: Voice, target: f32, over: Duration) {
        self.record(BackendCall::RampGain(voice, target, over));
        let from = self.gain(voice);
        let now = self.clock.now();
        let state = &mut self.voices[voice.index()];
        state.gain = target;
        state.ramp = Some(Ramp {
            from,
            to: target,
            started_at: now,
            over,
        });
    }

    fn position(&self, voice: Voice) -> Duration {
        let state = &self.voices[voice.index()];
        if !state.playing {
            return Duration::ZERO;
        }
        let played = state.offset + self.clock.now().saturating_sub(state.started_at);
        played.min(self.lengths[voice.index()])
    }

    fn duration(&self, voice: Voice) -> Option<Duration> {
        self.initialized.then(|| self.lengths[voice.index()])
    }

    fn frequency_data(&mut self, out: &mut [f32]) -> usize {
        self.analysis_reads += 1;
        let n = out.len().min(self.spectrum.len());
        out[..n].copy_from_slice(&self.spectrum[..n]);
        n
    }

    fn poll_ended(&mut self) -> Vec<Voice> {
        let ended: Vec<Voice> = Voice::ALL
            .into_iter()
            .filter(|&voice| {
                self.voices[voice.index()].playing && self.position(voice) >= self.lengths[voice.index()]
            })
            .collect();

        for &voice in &ended {
            self.halt(voice);
        }
        ended
    }
}
