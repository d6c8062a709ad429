//! Spectrum analysis of the output mix
//!
//! Windowed FFT over the most recent mono samples. Bin magnitudes are
//! smoothed over time, converted to dB and mapped from the
//! `[MIN_DB, MAX_DB]` window onto `[0, 1]`, so a silent mix reads 0 and a
//! loud one approaches 1.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Floor of the normalised window
pub const MIN_DB: f32 = -100.0;
/// Ceiling of the normalised window
pub const MAX_DB: f32 = -30.0;
/// Weight given to the previous frame
pub const SMOOTHING: f32 = 0.8;

/// FFT analyser producing normalised per-bin magnitudes
pub struct SpectrumAnalyzer {
    /// Hann window coefficients
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    /// FFT input/output buffer
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    /// Smoothed linear magnitudes, one per bin
    smoothed: Vec<f32>,
}

impl SpectrumAnalyzer {
    /// Analyser over `fft_size` samples, yielding `fft_size / 2` bins
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(2);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let denom = (fft_size - 1) as f32;
        let window = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / denom).cos()))
            .collect();

        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            window,
            fft,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    /// Analyser sized to produce `bins` bins
    pub fn with_bins(bins: usize) -> Self {
        Self::new(bins.max(1) * 2)
    }

    /// Samples consumed per analysis
    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    pub fn bins(&self) -> usize {
        self.smoothed.len()
    }

    /// Analyse `samples` (length `fft_size`) and write normalised bins into
    /// `out`, returning how many were written
    pub fn analyze(&mut self, samples: &[f32], out: &mut [f32]) -> usize {
        let size = self.window.len();
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = samples.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 1.0 / size as f32;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(&self.buffer) {
            let magnitude = bin.norm() * scale;
            *smoothed = SMOOTHING * *smoothed + (1.0 - SMOOTHING) * magnitude;
        }

        let written = out.len().min(self.smoothed.len());
        for (slot, &magnitude) in out.iter_mut().zip(&self.smoothed) {
            *slot = normalize(magnitude);
        }
        written
    }

    /// Forget smoothing history
    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
    }
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("fft_size", &self.fft_size())
            .field("bins", &self.bins())
            .finish_non_exhaustive()
    }
}

/// Map a linear magnitude into the `[MIN_DB, MAX_DB]` window as `[0, 1]`
fn normalize(magnitude: f32) -> f32 {
    if magnitude <= 0.0 {
        return 0.0;
    }
    let db = 20.0 * magnitude.log10();
    ((db - MIN_DB) / (MAX_DB - MIN_DB)).clamp(0.0, 1.0)
}
