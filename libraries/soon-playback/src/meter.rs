//! Level metering
//!
//! The level is the arithmetic mean of the backend's normalized spectrum
//! bins. It feeds a VU-style display; [`NeedleBallistics`] turns it into a
//! needle angle with some mechanical inertia.

use crate::backend::AudioBackend;

/// Mean of `bins`, clamped to 0.0..=1.0 (0.0 for an empty slice)
pub fn mean_magnitude(bins: &[f32]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: f32 = bins.iter().copied().sum();
    (sum / bins.len() as f32).clamp(0.0, 1.0)
}

/// Reads spectrum snapshots and publishes level changes
#[derive(Debug, Clone)]
pub struct LevelMeter {
    bins: Vec<f32>,
    published: f32,
}

impl LevelMeter {
    /// Meter reading `bins` frequency bins per sample
    pub fn new(bins: usize) -> Self {
        Self {
            bins: vec![0.0; bins],
            published: 0.0,
        }
    }

    /// Read one snapshot from the backend and reduce it to a level
    pub fn sample<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) -> f32 {
        let written = backend.frequency_data(&mut self.bins).min(self.bins.len());
        mean_magnitude(&self.bins[..written])
    }

    /// Record `level` as published. Returns true if it differs from the last one.
    pub fn publish(&mut self, level: f32) -> bool {
        let level = level.clamp(0.0, 1.0);
        if level == self.published {
            return false;
        }
        self.published = level;
        true
    }

    /// Last published level
    pub fn level(&self) -> f32 {
        self.published
    }
}

/// VU needle with attack/release inertia
///
/// Angles are in degrees, `REST` at silence and `PEAK` at full scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeedleBallistics {
    angle: f32,
    jitter: f32,
}

impl Default for NeedleBallistics {
    fn default() -> Self {
        Self::new()
    }
}

impl NeedleBallistics {
    pub const REST: f32 = -45.0;
    pub const PEAK: f32 = 45.0;

    /// Fraction of the gap closed per step while playing
    pub const ATTACK: f32 = 0.12;
    /// Fraction of the gap closed per step on the way back to rest
    pub const RELEASE: f32 = 0.1;
    /// Distance from rest at which the needle drops onto its stop
    pub const SNAP: f32 = 0.5;

    pub fn new() -> Self {
        Self {
            angle: Self::REST,
            jitter: 0.0,
        }
    }

    /// Add a wobble (in degrees) to the target angle while playing
    #[must_use]
    pub fn with_jitter(mut self, degrees: f32) -> Self {
        self.jitter = degrees.abs();
        self
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Angle a steady `level` would settle at
    pub fn target(level: f32) -> f32 {
        Self::REST + level.clamp(0.0, 1.0) * (Self::PEAK - Self::REST)
    }

    /// Advance one display frame
    ///
    /// `phase` in -1.0..=1.0 scales the jitter; pass 0.0 for a steady needle.
    pub fn update(&mut self, level: f32, playing: bool, phase: f32) -> f32 {
        if playing {
            let target = (Self::target(level) + self.jitter * phase.clamp(-1.0, 1.0))
                .clamp(Self::REST, Self::PEAK);
            self.angle += (target - self.angle) * Self::ATTACK;
        } else {
            self.angle += (Self::REST - self.angle) * Self::RELEASE;
            if (self.angle - Self::REST).abs() < Self::SNAP {
                self.angle = Self::REST;
            }
        }
        self.angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_bins() {
        assert_eq!(mean_magnitude(&[]), 0.0);
        assert_eq!(mean_magnitude(&[0.0, 0.5, 1.0]), 0.5);
        assert_eq!(mean_magnitude(&[2.0, 2.0]), 1.0);
        assert_eq!(mean_magnitude(&[-1.0, 0.0]), 0.0);
    }

    #[test]
    fn publish_reports_changes_only() {
        let mut meter = LevelMeter::new(4);
        assert!(!meter.publish(0.0));
        assert!(meter.publish(0.3));
        assert!(!meter.publish(0.3));
        assert!(meter.publish(0.0));
        assert_eq!(meter.level(), 0.0);
    }

    #[test]
    fn needle_rises_toward_level() {
        let mut needle = NeedleBallistics::new();
        let first = needle.update(1.0, true, 0.0);
        assert!((first - (-45.0 + 90.0 * 0.12)).abs() < 1e-4);

        for _ in 0..200 {
            needle.update(1.0, true, 0.0);
        }
        assert!((needle.angle() - NeedleBallistics::PEAK).abs() < 0.01);
    }

    #[test]
    fn needle_returns_and_snaps_to_rest() {
        let mut needle = NeedleBallistics::new();
        for _ in 0..100 {
            needle.update(0.5, true, 0.0);
        }
        assert!(needle.angle() > -1.0);

        let mut steps = 0;
        while needle.angle() != NeedleBallistics::REST {
            needle.update(0.5, false, 0.0);
            steps += 1;
            assert!(steps < 100, "needle never settled");
        }
        assert_eq!(needle.angle(), -45.0);
    }

    #[test]
    fn jitter_stays_within_scale() {
        let mut needle = NeedleBallistics::new().with_jitter(10.0);
        for i in 0..500 {
            let phase = if i % 2 == 0 { 1.0 } else { -1.0 };
            let angle = needle.update(1.0, true, phase);
            assert!((NeedleBallistics::REST..=NeedleBallistics::PEAK).contains(&angle));
        }
    }
}
