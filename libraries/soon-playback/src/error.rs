//! Error types for playback sequencing

use crate::types::PlaybackPhase;
use thiserror::Error;

/// Sequencer errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SequencerError {
    /// Audio engine could not initialize, or a clip failed to load or play
    #[error("Audio unavailable: {0}")]
    AudioUnavailable(String),

    /// Duration outside the allowed set, bad settings, or configuration outside idle
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Phase change not permitted by the state machine
    ///
    /// Raised by the transition guard only. Lifecycle races produce this
    /// routinely, so the sequencer swallows it instead of surfacing it.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Phase the sequencer was in
        from: PlaybackPhase,
        /// Phase that was requested
        to: PlaybackPhase,
    },
}

impl SequencerError {
    /// Create an `AudioUnavailable` error
    pub fn audio(message: impl Into<String>) -> Self {
        SequencerError::AudioUnavailable(message.into())
    }

    /// Create an `InvalidConfiguration` error
    pub fn config(message: impl Into<String>) -> Self {
        SequencerError::InvalidConfiguration(message.into())
    }

    /// Fold any error into `AudioUnavailable`, keeping its message
    pub(crate) fn into_unavailable(self) -> Self {
        match self {
            SequencerError::AudioUnavailable(_) => self,
            other => SequencerError::AudioUnavailable(other.to_string()),
        }
    }
}

/// Result type for sequencer operations
pub type Result<T> = std::result::Result<T, SequencerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_error_names_both_phases() {
        let err = SequencerError::InvalidTransition {
            from: PlaybackPhase::Idle,
            to: PlaybackPhase::Outro,
        };
        assert_eq!(err.to_string(), "Invalid transition: idle -> outro");
    }

    #[test]
    fn into_unavailable_keeps_message() {
        let err = SequencerError::config("bad duration").into_unavailable();
        assert_eq!(
            err,
            SequencerError::AudioUnavailable("Invalid configuration: bad duration".to_string())
        );

        let audio = SequencerError::audio("no device").into_unavailable();
        assert_eq!(audio, SequencerError::audio("no device"));
    }
}
