//! cpal implementation of the sequencer's audio backend
//!
//! **Architecture**: a dedicated audio thread owns the cpal `Stream` (it is
//! not `Send` on every platform) and just parks until shutdown. The control
//! side talks straight to the mixer inside the callback through a bounded
//! command channel, and hears about finished clips through a second one.

use crate::analyzer::SpectrumAnalyzer;
use crate::clip::{duration_to_frames, frames_to_duration, Clip};
use crate::error::{AudioError, Result};
use crate::host::Driver;
use crate::mixer::{AnalysisRing, EndedNotice, Mixer, MixerCommand, VoiceStatus};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use soon_playback::{AudioBackend, ClipSet, SequencerError, Voice};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Mixer command queue depth
const COMMAND_CAPACITY: usize = 64;
/// Ended notice queue depth
const NOTICE_CAPACITY: usize = 64;

/// Stream facts reported by the audio thread once the stream is running
#[derive(Debug, Clone, Copy)]
struct StreamInfo {
    sample_rate: u32,
    channels: usize,
}

/// Control-side view of a voice
#[derive(Debug, Default, Clone, Copy)]
struct VoiceControl {
    generation: u64,
    playing: bool,
    from_frame: usize,
    frames: usize,
}

/// Everything that exists only while the output is open
struct Engine {
    commands: Sender<MixerCommand>,
    ended: Receiver<EndedNotice>,
    status: Arc<[VoiceStatus; 4]>,
    analysis: Arc<Mutex<AnalysisRing>>,
    analyzer: SpectrumAnalyzer,
    window: Vec<f32>,
    sample_rate: u32,
    voices: [VoiceControl; 4],
    next_generation: u64,
    shutdown: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Engine {
    fn send(&self, command: MixerCommand) -> Result<()> {
        match self.commands.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(AudioError::PlayError(
                "mixer command queue full (stream stalled?)".into(),
            )),
            Err(TrySendError::Disconnected(_)) => Err(AudioError::Disconnected),
        }
    }

    fn send_or_warn(&self, command: MixerCommand) {
        if let Err(e) = self.send(command) {
            warn!("Dropped mixer command: {}", e);
        }
    }

    fn shutdown(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("Audio thread panicked");
            }
        }
    }
}

/// Desktop audio backend: cpal output, symphonia decoding, rustfft analysis
pub struct CpalBackend {
    driver: Driver,
    analysis_bins: usize,
    engine: Option<Engine>,
}

impl CpalBackend {
    /// Backend on the system default driver
    pub fn new() -> Self {
        Self::with_driver(Driver::Default)
    }

    pub fn with_driver(driver: Driver) -> Self {
        Self {
            driver,
            analysis_bins: 128,
            engine: None,
        }
    }

    /// Number of spectrum bins produced by `frequency_data`
    pub fn with_analysis_bins(mut self, bins: usize) -> Self {
        self.analysis_bins = bins.max(1);
        self
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    /// Output sample rate, once initialized
    pub fn sample_rate(&self) -> Option<u32> {
        self.engine.as_ref().map(|engine| engine.sample_rate)
    }

    /// Spawn the audio thread and wait for it to report the stream
    fn open(&self) -> Result<(Engine, StreamInfo)> {
        let (command_tx, command_rx) = bounded::<MixerCommand>(COMMAND_CAPACITY);
        let (ended_tx, ended_rx) = bounded::<EndedNotice>(NOTICE_CAPACITY);
        let (init_tx, init_rx) = bounded::<Result<StreamInfo>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let analyzer = SpectrumAnalyzer::with_bins(self.analysis_bins);
        let status: Arc<[VoiceStatus; 4]> = Arc::new(Default::default());
        let analysis = Arc::new(Mutex::new(AnalysisRing::new(analyzer.fft_size())));

        let mixer = Mixer::new(
            command_rx,
            ended_tx,
            Arc::clone(&status),
            Arc::clone(&analysis),
        );
        let driver = self.driver;

        let thread = thread::Builder::new()
            .name("soon-audio".into())
            .spawn(move || audio_thread_run(driver, mixer, &init_tx, &shutdown_rx))?;

        let info = match init_rx.recv() {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(AudioError::Disconnected);
            }
        };

        let window = vec![0.0; analyzer.fft_size()];
        let engine = Engine {
            commands: command_tx,
            ended: ended_rx,
            status,
            analysis,
            analyzer,
            window,
            sample_rate: info.sample_rate,
            voices: [VoiceControl::default(); 4],
            next_generation: 1,
            shutdown: shutdown_tx,
            thread: Some(thread),
        };
        Ok((engine, info))
    }

    fn load_clips(engine: &mut Engine, clips: &ClipSet) -> Result<()> {
        let intro = Clip::load(&clips.intro, engine.sample_rate)?;
        let loop_clip = Clip::load(&clips.loop_clip, engine.sample_rate)?;
        let outro = Clip::load(&clips.outro, engine.sample_rate)?;

        for voice in Voice::ALL {
            let clip = match voice {
                Voice::Intro => &intro,
                Voice::Loop(_) => &loop_clip,
                Voice::Outro => &outro,
            };
            engine.voices[voice.index()].frames = clip.frames();
            engine.send(MixerCommand::Load {
                voice,
                samples: clip.samples(),
            })?;
        }
        Ok(())
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn initialize(&mut self, clips: &ClipSet) -> soon_playback::Result<()> {
        if self.engine.is_some() {
            return Ok(());
        }

        let (mut engine, info) = self.open().map_err(SequencerError::from)?;
        if let Err(e) = Self::load_clips(&mut engine, clips) {
            engine.shutdown();
            return Err(e.into());
        }

        info!(
            driver = %self.driver,
            sample_rate = info.sample_rate,
            channels = info.channels,
            "Audio output ready"
        );
        self.engine = Some(engine);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    fn play(&mut self, voice: Voice, from: Duration) -> soon_playback::Result<()> {
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| AudioError::ClipNotLoaded(format!("{voice:?}")))?;

        let control = engine.voices[voice.index()];
        let frame = duration_to_frames(from, engine.sample_rate).min(control.frames);
        let generation = engine.next_generation;
        engine.next_generation += 1;

        engine.send(MixerCommand::Play {
            voice,
            frame,
            generation,
        })?;

        let control = &mut engine.voices[voice.index()];
        control.generation = generation;
        control.playing = true;
        control.from_frame = frame;
        debug!(?voice, ?from, generation, "Voice started");
        Ok(())
    }

    fn stop(&mut self, voice: Voice) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        engine.voices[voice.index()].playing = false;
        engine.send_or_warn(MixerCommand::Stop { voice });
    }

    fn stop_all(&mut self) {
        for voice in Voice::ALL {
            self.stop(voice);
        }
        if let Some(engine) = self.engine.as_mut() {
            while engine.ended.try_recv().is_ok() {}
            // The next session starts from a silent meter
            engine
                .analysis
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            engine.analyzer.reset();
        }
    }

    fn set_gain(&mut self, voice: Voice, gain: f32) {
        if let Some(engine) = self.engine.as_ref() {
            engine.send_or_warn(MixerCommand::SetGain {
                voice,
                gain: gain.clamp(0.0, 1.0),
            });
        }
    }

    fn ramp_gain(&mut self, voice: Voice, target: f32, over: Duration) {
        if let Some(engine) = self.engine.as_ref() {
            engine.send_or_warn(MixerCommand::RampGain {
                voice,
                target: target.clamp(0.0, 1.0),
                frames: duration_to_frames(over, engine.sample_rate),
            });
        }
    }

    fn position(&self, voice: Voice) -> Duration {
        let Some(engine) = self.engine.as_ref() else {
            return Duration::ZERO;
        };
        let control = engine.voices[voice.index()];
        if !control.playing {
            return Duration::ZERO;
        }
        // The callback may not have picked up the play command yet
        let frame = engine.status[voice.index()]
            .frame_for(control.generation)
            .unwrap_or(control.from_frame);
        frames_to_duration(frame, engine.sample_rate)
    }

    fn duration(&self, voice: Voice) -> Option<Duration> {
        let engine = self.engine.as_ref()?;
        Some(frames_to_duration(
            engine.voices[voice.index()].frames,
            engine.sample_rate,
        ))
    }

    fn frequency_data(&mut self, out: &mut [f32]) -> usize {
        let Some(engine) = self.engine.as_mut() else {
            return 0;
        };
        engine
            .analysis
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot(&mut engine.window);
        engine.analyzer.analyze(&engine.window, out)
    }

    fn poll_ended(&mut self) -> Vec<Voice> {
        let Some(engine) = self.engine.as_mut() else {
            return Vec::new();
        };
        let mut ended = Vec::new();
        while let Ok(notice) = engine.ended.try_recv() {
            let control = &mut engine.voices[notice.voice.index()];
            // Notices from a superseded play are stale
            if control.playing && control.generation == notice.generation {
                control.playing = false;
                ended.push(notice.voice);
            }
        }
        ended
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.shutdown();
        }
    }
}

impl std::fmt::Debug for CpalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalBackend")
            .field("driver", &self.driver)
            .field("analysis_bins", &self.analysis_bins)
            .field("sample_rate", &self.sample_rate())
            .finish()
    }
}

/// Audio thread main loop
///
/// Builds and starts the stream, reports the outcome, then holds the stream
/// alive until shutdown is requested or the control side goes away.
fn audio_thread_run(
    driver: Driver,
    mut mixer: Mixer,
    init: &Sender<Result<StreamInfo>>,
    shutdown: &Receiver<()>,
) {
    let opened = (|| -> Result<(cpal::Stream, StreamInfo)> {
        let (device, supported) = driver.default_output()?;
        let sample_rate = supported.sample_rate();
        let config = supported.config();
        let channels = usize::from(config.channels);

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                mixer.render(data, channels);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )?;
        stream.play()?;

        Ok((
            stream,
            StreamInfo {
                sample_rate,
                channels,
            },
        ))
    })();

    let stream = match opened {
        Ok((stream, info)) => {
            let _ = init.send(Ok(info));
            stream
        }
        Err(e) => {
            warn!(driver = %driver, "Failed to open audio output: {}", e);
            let _ = init.send(Err(e));
            return;
        }
    };

    // Either a shutdown message or the sender being dropped ends the thread
    let _ = shutdown.recv();
    drop(stream);
    debug!("Audio thread stopped");
}
