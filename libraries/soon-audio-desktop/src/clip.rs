//! Clip decoding
//!
//! Sessions use three short clips, so each one is decoded completely up
//! front into interleaved stereo f32 at the output device's rate. The audio
//! callback then only ever indexes into memory.
//!
//! Channel handling: mono is duplicated to both sides, anything wider keeps
//! its first two channels.

use crate::error::{AudioError, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Frames fed to the resampler per call
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

/// Facts about a source file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipInfo {
    pub path: PathBuf,
    /// Sample rate of the file
    pub sample_rate: u32,
    /// Channel count of the file
    pub channels: usize,
    /// Frames at the file's own rate
    pub frames: usize,
}

impl ClipInfo {
    pub fn duration(&self) -> Duration {
        frames_to_duration(self.frames, self.sample_rate)
    }
}

/// Decoded audio at the file's own rate
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub info: ClipInfo,
    /// Interleaved stereo samples
    pub samples: Vec<f32>,
}

/// A clip ready for the mixer: interleaved stereo at the output rate
#[derive(Debug, Clone)]
pub struct Clip {
    samples: Arc<[f32]>,
    sample_rate: u32,
    info: ClipInfo,
}

impl Clip {
    /// Decode `path` and convert it to `target_rate`
    pub fn load(path: impl AsRef<Path>, target_rate: u32) -> Result<Self> {
        let decoded = decode_file(path)?;
        let samples = if decoded.info.sample_rate == target_rate {
            decoded.samples
        } else {
            debug!(
                path = %decoded.info.path.display(),
                from = decoded.info.sample_rate,
                to = target_rate,
                "Resampling clip"
            );
            resample_stereo(&decoded.samples, decoded.info.sample_rate, target_rate)?
        };

        Ok(Self {
            samples: samples.into(),
            sample_rate: target_rate,
            info: decoded.info,
        })
    }

    /// Shared sample data
    pub fn samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames at the output rate
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration(&self) -> Duration {
        frames_to_duration(self.frames(), self.sample_rate)
    }

    /// The source file this clip was decoded from
    pub fn info(&self) -> &ClipInfo {
        &self.info
    }
}

pub(crate) fn frames_to_duration(frames: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(frames as f64 / f64::from(sample_rate))
}

pub(crate) fn duration_to_frames(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * f64::from(sample_rate)).round() as usize
}

/// Decode a whole file to interleaved stereo at its own rate
pub fn decode_file(path: impl AsRef<Path>) -> Result<DecodedAudio> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| AudioError::decode(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::decode(path, e))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AudioError::decode(path, "no audio track"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| AudioError::decode(path, "unknown sample rate"))?;
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::decode(path, e))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AudioError::decode(path, e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                warn!(path = %path.display(), "Skipping corrupt packet: {}", msg);
                continue;
            }
            Err(e) => return Err(AudioError::decode(path, e)),
        };

        let spec = *decoded.spec();
        let frame_channels = spec.channels.count().max(1);
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);

        for frame in buf.samples().chunks_exact(frame_channels) {
            let left = frame[0];
            let right = if frame_channels > 1 { frame[1] } else { left };
            samples.push(left);
            samples.push(right);
        }
    }

    if samples.is_empty() {
        return Err(AudioError::decode(path, "no audio frames"));
    }

    let info = ClipInfo {
        path: path.to_path_buf(),
        sample_rate,
        channels,
        frames: samples.len() / 2,
    };
    debug!(
        path = %path.display(),
        sample_rate,
        channels,
        duration_ms = info.duration().as_millis() as u64,
        "Decoded clip"
    );

    Ok(DecodedAudio { info, samples })
}

/// Resample interleaved stereo from `from` Hz to `to` Hz
///
/// Feeds the resampler fixed-size chunks, flushes its tail and trims the
/// filter delay so the output lines up with the input.
pub fn resample_stereo(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let frames = samples.len() / 2;
    let ratio = f64::from(to) / f64::from(from);

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK_FRAMES, 2)?;

    // Deinterleave for rubato
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in samples.chunks_exact(2) {
        left.push(frame[0]);
        right.push(frame[1]);
    }

    let mut out = [Vec::new(), Vec::new()];

    let mut offset = 0;
    while offset + RESAMPLE_CHUNK_FRAMES <= frames {
        let end = offset + RESAMPLE_CHUNK_FRAMES;
        let chunk = [&left[offset..end], &right[offset..end]];
        append(&mut out, resampler.process(&chunk[..], None)?);
        offset = end;
    }
    if offset < frames {
        let tail = [&left[offset..], &right[offset..]];
        append(&mut out, resampler.process_partial(Some(&tail[..]), None)?);
    }

    // Flush the filter tail
    let delay = resampler.output_delay();
    let expected = (frames as f64 * ratio).round() as usize;
    while out[0].len() < delay + expected {
        let before = out[0].len();
        append(&mut out, resampler.process_partial(None::<&[&[f32]]>, None)?);
        if out[0].len() == before {
            break;
        }
    }

    let end = (delay + expected).min(out[0].len());
    let start = delay.min(end);
    let mut interleaved = Vec::with_capacity((end - start) * 2);
    for (&l, &r) in out[0][start..end].iter().zip(&out[1][start..end]) {
        interleaved.push(l);
        interleaved.push(r);
    }
    Ok(interleaved)
}

fn append(out: &mut [Vec<f32>; 2], chunk: Vec<Vec<f32>>) {
    for (channel, data) in out.iter_mut().zip(chunk) {
        channel.extend(data);
    }
}
