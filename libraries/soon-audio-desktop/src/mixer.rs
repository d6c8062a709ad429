//! Four-voice mixer (runs in the real-time audio callback)
//!
//! ```text
//!   control thread                 audio callback
//!        │   MixerCommand (bounded)      │
//!        │──────────────────────────────>│ drain commands
//!        │                               │ render voices * gain ramps
//!        │   EndedNotice (bounded)       │ mono tap -> analysis ring
//!        │<──────────────────────────────│
//! ```
//!
//! Gains ramp per frame, so a crossfade is sample accurate no matter how
//! late the host polls. The callback never blocks: commands are drained with
//! `try_recv`, notices sent with `try_send`, the analysis ring is skipped if
//! its lock is contended.

use crossbeam_channel::{Receiver, Sender};
use soon_playback::Voice;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Control messages for the callback
#[derive(Debug, Clone)]
pub(crate) enum MixerCommand {
    /// Bind a clip (interleaved stereo) to a voice
    Load { voice: Voice, samples: Arc<[f32]> },
    /// Start a voice at `frame`; `generation` tags its ended notice
    Play {
        voice: Voice,
        frame: usize,
        generation: u64,
    },
    /// Halt and rewind a voice
    Stop { voice: Voice },
    /// Jump a voice's gain, cancelling any ramp
    SetGain { voice: Voice, gain: f32 },
    /// Ramp a voice's gain linearly to `target` over `frames`
    RampGain {
        voice: Voice,
        target: f32,
        frames: usize,
    },
}

/// A voice reached the end of its clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EndedNotice {
    pub voice: Voice,
    pub generation: u64,
}

/// Per-voice playhead published by the callback
#[derive(Debug, Default)]
pub(crate) struct VoiceStatus {
    generation: AtomicU64,
    frame: AtomicU64,
}

impl VoiceStatus {
    /// Playhead frame if it belongs to `generation`
    pub fn frame_for(&self, generation: u64) -> Option<usize> {
        if self.generation.load(Ordering::Acquire) != generation {
            return None;
        }
        Some(self.frame.load(Ordering::Relaxed) as usize)
    }

    fn publish(&self, generation: u64, frame: usize) {
        self.frame.store(frame as u64, Ordering::Relaxed);
        self.generation.store(generation, Ordering::Release);
    }
}

/// Most recent mono samples of the mix
#[derive(Debug)]
pub(crate) struct AnalysisRing {
    data: Vec<f32>,
    write: usize,
}

impl AnalysisRing {
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0.0; len.max(1)],
            write: 0,
        }
    }

    fn push(&mut self, sample: f32) {
        self.data[self.write] = sample;
        self.write = (self.write + 1) % self.data.len();
    }

    /// Copy out the ring, oldest sample first
    pub fn snapshot(&self, out: &mut [f32]) {
        let len = self.data.len();
        let take = out.len().min(len);
        let start = (self.write + len - take) % len;
        for (i, slot) in out.iter_mut().take(take).enumerate() {
            *slot = self.data[(start + i) % len];
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.write = 0;
    }
}

#[derive(Debug, Clone, Copy)]
struct GainRamp {
    from: f32,
    to: f32,
    frames: usize,
    elapsed: usize,
}

impl GainRamp {
    #[inline]
    fn next(&mut self) -> f32 {
        if self.elapsed >= self.frames {
            return self.to;
        }
        let t = self.elapsed as f32 / self.frames as f32;
        self.elapsed += 1;
        self.from + (self.to - self.from) * t
    }

    fn is_done(&self) -> bool {
        self.elapsed >= self.frames
    }
}

#[derive(Debug, Default)]
struct VoiceState {
    samples: Option<Arc<[f32]>>,
    playing: bool,
    frame: usize,
    generation: u64,
    gain: f32,
    ramp: Option<GainRamp>,
}

impl VoiceState {
    fn frames(&self) -> usize {
        self.samples.as_ref().map_or(0, |s| s.len() / 2)
    }

    #[inline]
    fn next_gain(&mut self) -> f32 {
        match &mut self.ramp {
            Some(ramp) => {
                let gain = ramp.next();
                if ramp.is_done() {
                    self.gain = ramp.to;
                    self.ramp = None;
                }
                gain
            }
            None => self.gain,
        }
    }

    fn current_gain(&self) -> f32 {
        match &self.ramp {
            Some(ramp) if ramp.frames > 0 => {
                ramp.from + (ramp.to - ramp.from) * (ramp.elapsed as f32 / ramp.frames as f32)
            }
            Some(ramp) => ramp.to,
            None => self.gain,
        }
    }
}

/// Callback-side mixer state
pub(crate) struct Mixer {
    voices: [VoiceState; 4],
    commands: Receiver<MixerCommand>,
    ended: Sender<EndedNotice>,
    status: Arc<[VoiceStatus; 4]>,
    analysis: Arc<Mutex<AnalysisRing>>,
}

impl Mixer {
    pub fn new(
        commands: Receiver<MixerCommand>,
        ended: Sender<EndedNotice>,
        status: Arc<[VoiceStatus; 4]>,
        analysis: Arc<Mutex<AnalysisRing>>,
    ) -> Self {
        Self {
            voices: Default::default(),
            commands,
            ended,
            status,
            analysis,
        }
    }

    fn apply(&mut self, command: MixerCommand) {
        match command {
            MixerCommand::Load { voice, samples } => {
                let state = &mut self.voices[voice.index()];
                state.samples = Some(samples);
                state.playing = false;
                state.frame = 0;
            }
            MixerCommand::Play {
                voice,
                frame,
                generation,
            } => {
                let state = &mut self.voices[voice.index()];
                state.playing = state.samples.is_some();
                state.frame = frame;
                state.generation = generation;
            }
            MixerCommand::Stop { voice } => {
                let state = &mut self.voices[voice.index()];
                state.playing = false;
                state.frame = 0;
            }
            MixerCommand::SetGain { voice, gain } => {
                let state = &mut self.voices[voice.index()];
                state.gain = gain;
                state.ramp = None;
            }
            MixerCommand::RampGain {
                voice,
                target,
                frames,
            } => {
                let state = &mut self.voices[voice.index()];
                let from = state.current_gain();
                state.gain = target;
                state.ramp = Some(GainRamp {
                    from,
                    to: target,
                    frames,
                    elapsed: 0,
                });
            }
        }
    }

    /// Fill an interleaved output buffer with `channels` channels
    pub fn render(&mut self, output: &mut [f32], channels: usize) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }

        output.fill(0.0);
        let channels = channels.max(1);
        let frames = output.len() / channels;

        for state in &mut self.voices {
            if !state.playing {
                continue;
            }
            let Some(samples) = state.samples.clone() else {
                continue;
            };
            let clip_frames = samples.len() / 2;

            for frame in output.chunks_exact_mut(channels).take(frames) {
                // Ramps keep running on the voice's own timeline
                let gain = state.next_gain();
                if state.frame >= clip_frames {
                    break;
                }
                let left = samples[state.frame * 2] * gain;
                let right = samples[state.frame * 2 + 1] * gain;
                state.frame += 1;

                match channels {
                    1 => frame[0] += 0.5 * (left + right),
                    _ => {
                        frame[0] += left;
                        frame[1] += right;
                    }
                }
            }
        }

        for (index, state) in self.voices.iter_mut().enumerate() {
            if state.playing && state.frame >= state.frames() {
                state.playing = false;
                let voice = Voice::ALL[index];
                let _ = self.ended.try_send(EndedNotice {
                    voice,
                    generation: state.generation,
                });
            }
            self.status[index].publish(state.generation, state.frame);
        }

        if let Ok(mut ring) = self.analysis.try_lock() {
            for frame in output.chunks_exact(channels) {
                let mono = frame.iter().take(2).sum::<f32>() / channels.min(2) as f32;
                ring.push(mono);
            }
        }
    }
}
