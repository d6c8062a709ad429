//! Duration dial
//!
//! A rotary selector that steps through the allowed sleep durations.

use crate::types::DEFAULT_DURATIONS;

/// Cycling duration selector
#[derive(Debug, Clone, PartialEq)]
pub struct DurationDial {
    options: Vec<u32>,
    current: u32,
    rotation: f32,
}

impl Default for DurationDial {
    fn default() -> Self {
        Self::new(DEFAULT_DURATIONS.to_vec(), DEFAULT_DURATIONS[0])
    }
}

impl DurationDial {
    /// Dial over `options`, pointing at `current`
    ///
    /// An empty option list falls back to the default durations.
    pub fn new(options: Vec<u32>, current: u32) -> Self {
        let options = if options.is_empty() {
            DEFAULT_DURATIONS.to_vec()
        } else {
            options
        };
        Self {
            options,
            current,
            rotation: 0.0,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn options(&self) -> &[u32] {
        &self.options
    }

    /// Cumulative knob rotation in degrees
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Degrees turned per click
    pub fn step_degrees(&self) -> f32 {
        360.0 / self.options.len() as f32
    }

    /// Value the next click selects
    pub fn peek_next(&self) -> u32 {
        match self.options.iter().position(|&v| v == self.current) {
            Some(i) => self.options[(i + 1) % self.options.len()],
            None => self.options[0],
        }
    }

    /// Turn one click. Returns the new value.
    pub fn advance(&mut self) -> u32 {
        self.current = self.peek_next();
        self.rotation += self.step_degrees();
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_and_wraps() {
        let mut dial = DurationDial::new(DEFAULT_DURATIONS.to_vec(), 60);
        assert_eq!(dial.advance(), 90);
        assert_eq!(dial.advance(), 15);
        assert_eq!(dial.advance(), 30);
        assert_eq!(dial.rotation(), 216.0);
    }

    #[test]
    fn full_turn_returns_home() {
        let mut dial = DurationDial::default();
        assert_eq!(dial.step_degrees(), 72.0);
        for _ in 0..5 {
            dial.advance();
        }
        assert_eq!(dial.current(), 15);
        assert_eq!(dial.rotation(), 360.0);
    }

    #[test]
    fn unknown_value_restarts_at_first() {
        let mut dial = DurationDial::new(vec![20, 40], 25);
        assert_eq!(dial.peek_next(), 20);
        assert_eq!(dial.advance(), 20);
        assert_eq!(dial.step_degrees(), 180.0);
    }
}
