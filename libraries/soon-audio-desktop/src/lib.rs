//! Desktop audio for the So-On sleep deck
//!
//! This crate provides [`CpalBackend`], the desktop implementation of
//! `soon_playback::AudioBackend`.
//!
//! # Features
//!
//! - Cross-platform output through CPAL (system default, ASIO, JACK)
//! - Whole-clip decoding with Symphonia, resampled to the device rate
//! - Four-voice mixer with sample-accurate linear gain ramps
//! - FFT spectrum of the output mix for level metering
//!
//! # Example
//!
//! ```no_run
//! use soon_audio_desktop::CpalBackend;
//! use soon_playback::{ClipSet, PlaybackSequencer, SequencerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let clips = ClipSet::new("assets/intro.mp3", "assets/loop.mp3", "assets/outro.mp3");
//! let mut sequencer = PlaybackSequencer::new(CpalBackend::new(), clips, SequencerConfig::default())?;
//!
//! sequencer.configure(30)?;
//! sequencer.start()?;
//! loop {
//!     sequencer.poll();
//!     if !sequencer.phase().is_playing() {
//!         break;
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

mod analyzer;
mod backend;
mod clip;
mod error;
mod host;
mod mixer;

pub use analyzer::SpectrumAnalyzer;
pub use backend::CpalBackend;
pub use clip::{decode_file, resample_stereo, Clip, ClipInfo, DecodedAudio};
pub use error::{AudioError, Result};
pub use host::{probe_drivers, Driver, DriverInfo};
