//! Platform-agnostic audio backend trait
//!
//! Abstracts the audio engine for different platforms (cpal on desktop,
//! native bridges on mobile, fakes in tests).

use crate::error::Result;
use crate::types::{ClipSet, Voice};
use std::time::Duration;

/// Audio engine capability used by the sequencer
///
/// The backend owns four voices (intro, loop slot A, loop slot B, outro).
/// Both loop slots play the same loop clip. Gains apply per voice and are
/// mixed inside the engine.
///
/// Clip completion is reported asynchronously: when a playing voice reaches
/// the end of its clip, the backend stops it and queues a notification that
/// the sequencer collects through [`AudioBackend::poll_ended`].
pub trait AudioBackend {
    /// Open the output and load the clips
    ///
    /// Called lazily from the first `start()`. On failure nothing may be
    /// left playing and `is_initialized()` must stay false.
    fn initialize(&mut self, clips: &ClipSet) -> Result<()>;

    /// Whether `initialize` has succeeded
    fn is_initialized(&self) -> bool;

    /// Start a voice from `from`
    fn play(&mut self, voice: Voice, from: Duration) -> Result<()>;

    /// Halt a voice and rewind it to the start
    ///
    /// A stopped voice never reports completion.
    fn stop(&mut self, voice: Voice);

    /// Halt every voice, rewind, and discard queued completion notices
    fn stop_all(&mut self) {
        for voice in Voice::ALL {
            self.stop(voice);
        }
    }

    /// Set a voice's gain immediately, cancelling any ramp in progress
    fn set_gain(&mut self, voice: Voice, gain: f32);

    /// Ramp a voice's gain linearly from its current value to `target`
    ///
    /// The ramp starts now and runs on the engine's own timeline, so it is
    /// sample accurate regardless of how often the host polls.
    fn ramp_gain(&mut self, voice: Voice, target: f32, over: Duration);

    /// Current playback position of a voice
    fn position(&self, voice: Voice) -> Duration;

    /// Length of the clip bound to a voice, once known
    fn duration(&self, voice: Voice) -> Option<Duration>;

    /// Fill `out` with a frequency-domain snapshot of the mix
    ///
    /// Each bin is normalized to 0.0..=1.0. Returns the number of bins written.
    fn frequency_data(&mut self, out: &mut [f32]) -> usize;

    /// Voices that reached the end of their clip since the last call
    fn poll_ended(&mut self) -> Vec<Voice>;
}

impl<B: AudioBackend + ?Sized> AudioBackend for Box<B> {
    fn initialize(&mut self, clips: &ClipSet) -> Result<()> {
        (**self).initialize(clips)
    }

    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }

    fn play(&mut self, voice: Voice, from: Duration) -> Result<()> {
        (**self).play(voice, from)
    }

    fn stop(&mut self, voice: Voice) {
        (**self).stop(voice);
    }

    fn stop_all(&mut self) {
        (**self).stop_all();
    }

    fn set_gain(&mut self, voice: Voice, gain: f32) {
        (**self).set_gain(voice, gain);
    }

    fn ramp_gain(&mut self, voice: Voice, target: f32, over: Duration) {
        (**self).ramp_gain(voice, target, over);
    }

    fn position(&self, voice: Voice) -> Duration {
        (**self).position(voice)
    }

    fn duration(&self, voice: Voice) -> Option<Duration> {
        (**self).duration(voice)
    }

    fn frequency_data(&mut self, out: &mut [f32]) -> usize {
        (**self).frequency_data(out)
    }

    fn poll_ended(&mut self) -> Vec<Voice> {
        (**self).poll_ended()
    }
}
